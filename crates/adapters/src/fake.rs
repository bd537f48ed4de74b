// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted [`ToolRunner`] for tests in this crate and downstream ones.
//!
//! Responses are consumed in FIFO order; every call is recorded so tests
//! can assert on the exact argv sequence the code under test produced.

use crate::output::{CapturedOutput, OutputCaps};
use crate::runner::{RunOutcome, RunSpec, ToolRunner};
use async_trait::async_trait;
use parking_lot::Mutex;
use rc_core::ProcessStatus;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

type Effect = Arc<dyn Fn(&RunSpec) + Send + Sync>;

/// One scripted response.
#[derive(Clone)]
pub struct FakeResponse {
    pub status: ProcessStatus,
    pub lines: Vec<String>,
    /// Side effect applied when the call is made; lets tests mimic a
    /// tool's on-disk footprint (e.g. `git svn` writing its rev-map).
    effect: Option<Effect>,
}

impl std::fmt::Debug for FakeResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeResponse")
            .field("status", &self.status)
            .field("lines", &self.lines)
            .field("has_effect", &self.effect.is_some())
            .finish()
    }
}

impl FakeResponse {
    /// Exit 0 with the given output lines.
    pub fn ok<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::exit(0, lines)
    }

    /// Exit with `code` and the given output lines.
    pub fn exit<I, S>(code: i32, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: ProcessStatus::Exited { code },
            lines: lines.into_iter().map(Into::into).collect(),
            effect: None,
        }
    }

    /// Killed by the inactivity timeout after producing `lines`.
    pub fn stalled<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: ProcessStatus::Stalled,
            lines: lines.into_iter().map(Into::into).collect(),
            effect: None,
        }
    }

    /// Never spawned.
    pub fn spawn_error() -> Self {
        Self {
            status: ProcessStatus::SpawnError,
            lines: Vec::new(),
            effect: None,
        }
    }

    /// Attach a side effect run when this response is served.
    pub fn with_effect(mut self, effect: impl Fn(&RunSpec) + Send + Sync + 'static) -> Self {
        self.effect = Some(Arc::new(effect));
        self
    }
}

/// FIFO-scripted runner that records every call.
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<VecDeque<FakeResponse>>,
    calls: Mutex<Vec<RunSpec>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn push(&self, response: FakeResponse) {
        self.responses.lock().push_back(response);
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<RunSpec> {
        self.calls.lock().clone()
    }

    /// Argv of every call whose first elements equal `prefix`.
    pub fn calls_starting_with(&self, prefix: &[&str]) -> Vec<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .map(|spec| spec.argv.clone())
            .filter(|argv| {
                argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p)
            })
            .collect()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, spec: RunSpec) -> RunOutcome {
        let response = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| FakeResponse::ok(Vec::<String>::new()));
        self.calls.lock().push(spec.clone());
        if let Some(effect) = &response.effect {
            effect(&spec);
        }

        let output = CapturedOutput::truncate(response.lines, OutputCaps::default());
        // Success judged exactly as the real runner does it.
        let success = match response.status {
            ProcessStatus::Exited { code } => match spec.success {
                Some(judge) => judge(code, &output),
                None => code == 0,
            },
            _ => false,
        };

        RunOutcome {
            status: response.status,
            output,
            runtime: Duration::from_millis(1),
            pid: 0,
            success,
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
