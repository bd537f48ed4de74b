// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Soft validation of a resolved store.
//!
//! Hard errors (missing url, duplicate keys, bad layout) are caught
//! during [`crate::RepoStore`] resolution; this pass produces advisory
//! warnings the daemon logs once per load.

use crate::store::RepoStore;
use rc_core::VcsType;

/// Lint a resolved store. Returns one human-readable warning per issue,
/// in store order; empty means clean.
pub fn lint(store: &RepoStore) -> Vec<String> {
    let mut warnings = Vec::new();

    for repo in store.iter() {
        let key = &repo.repo_key;

        if repo.vcs != VcsType::Svn {
            warnings.push(format!(
                "{key}: type '{}' is reserved and will be skipped by the scheduler",
                repo.vcs
            ));
        }

        if !repo.url.contains("://") {
            warnings.push(format!("{key}: url '{}' has no scheme", repo.url));
        }

        if repo.layout.trunk().is_none() && repo.layout.branches().is_empty() {
            warnings.push(format!(
                "{key}: layout declares neither trunk nor branches; nothing will be fetched"
            ));
        }

        if let Some(interval) = repo.fetch_interval {
            if interval.as_secs() < 60 {
                warnings.push(format!(
                    "{key}: fetch-interval-seconds {} is below 60s and will hammer the server",
                    interval.as_secs()
                ));
            }
        }

        if repo.username.is_some() && repo.password.is_none() {
            warnings.push(format!("{key}: username set but no password"));
        }
    }

    warnings
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
