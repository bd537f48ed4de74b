// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential redaction sink.
//!
//! Secrets are registered the moment they are read from the manifest;
//! every string that could reach a log line or a stored record is passed
//! through [`RedactionSink::redact`] first. Replacement uses a stable
//! placeholder so log lines stay diffable across runs.

use parking_lot::RwLock;
use std::sync::Arc;

/// Placeholder substituted for every registered secret.
pub const PLACEHOLDER: &str = "<REDACTED>";

/// Shared, append-only registry of secret substrings.
#[derive(Clone, Default)]
pub struct RedactionSink {
    secrets: Arc<RwLock<Vec<String>>>,
}

impl RedactionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret. Empty strings are ignored; duplicates are
    /// stored once. Longer secrets are kept ahead of shorter ones so a
    /// secret that contains another is replaced whole.
    pub fn register(&self, secret: impl Into<String>) {
        let secret = secret.into();
        if secret.is_empty() {
            return;
        }
        let mut secrets = self.secrets.write();
        if secrets.contains(&secret) {
            return;
        }
        let at = secrets
            .iter()
            .position(|s| s.len() < secret.len())
            .unwrap_or(secrets.len());
        secrets.insert(at, secret);
    }

    /// Replace every registered secret in `input` with the placeholder.
    pub fn redact(&self, input: &str) -> String {
        let secrets = self.secrets.read();
        let mut out = input.to_string();
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), PLACEHOLDER);
            }
        }
        out
    }

    /// Redact each element of an argv. Applied once, at spawn entry.
    pub fn redact_argv(&self, argv: &[String]) -> Vec<String> {
        argv.iter().map(|arg| self.redact(arg)).collect()
    }

    /// Number of registered secrets (for startup diagnostics).
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

impl std::fmt::Debug for RedactionSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secrets themselves.
        f.debug_struct("RedactionSink")
            .field("registered", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "redact_tests.rs"]
mod tests;
