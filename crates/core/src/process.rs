// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child-process records.
//!
//! One record per tracked OS process, created at spawn and finalized at
//! reap. The process runner is the only writer while the child lives; the
//! status monitor reads snapshots.

use crate::clock::Clock;
use crate::repo::RepoKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Final (or current) status of a tracked child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Still running.
    Running,
    /// Exited on its own.
    Exited { code: i32 },
    /// Killed by a signal not sent by us.
    Signalled { signal: i32 },
    /// Killed by the runner after the wall-clock timeout.
    TimedOut,
    /// Killed by the runner after the I/O-inactivity timeout.
    Stalled,
    /// Never started; the OS error is in the record's `error` field.
    SpawnError,
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessStatus::Running)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Exited { code } => write!(f, "exited:{code}"),
            ProcessStatus::Signalled { signal } => write!(f, "signalled:{signal}"),
            ProcessStatus::TimedOut => write!(f, "timeout"),
            ProcessStatus::Stalled => write!(f, "stalled"),
            ProcessStatus::SpawnError => write!(f, "spawn_error"),
        }
    }
}

/// Point-in-time resource usage of one process, sampled from `/proc`.
///
/// Every field is optional: a process may disappear or deny access
/// between samples, and a partial record is better than none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// Kernel state letter (`R`, `S`, `D`, `Z`, ...).
    pub state: Option<char>,
    pub utime_ticks: Option<u64>,
    pub stime_ticks: Option<u64>,
    pub rss_bytes: Option<u64>,
    pub open_fds: Option<u32>,
    /// Open socket descriptors, a proxy for network connections.
    pub sockets: Option<u32>,
    pub sampled_at_ms: u64,
}

/// Cap on the rolling output tail kept in a live record. The full
/// (truncated) output travels in the run outcome instead.
pub const OUTPUT_TAIL_CAP: usize = 50;

/// One tracked OS process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    /// Process group of the child subtree; one signal reaches all of it.
    pub pgid: u32,
    /// Redacted at construction; the raw argv is never stored or logged.
    pub argv: Vec<String>,
    pub repo_key: Option<RepoKey>,
    pub status: ProcessStatus,
    pub started_at_ms: u64,
    #[serde(skip, default = "Instant::now")]
    started: Instant,
    pub last_activity_ms: u64,
    /// Most recent output lines, capped at [`OUTPUT_TAIL_CAP`].
    pub output_tail: Vec<String>,
    /// OS error message for `spawn_error` records.
    pub error: Option<String>,
}

impl ChildProcessRecord {
    pub fn new(
        pid: u32,
        pgid: u32,
        argv: Vec<String>,
        repo_key: Option<RepoKey>,
        clock: &(impl Clock + ?Sized),
    ) -> Self {
        Self {
            pid,
            ppid: std::process::id(),
            pgid,
            argv,
            repo_key,
            status: ProcessStatus::Running,
            started_at_ms: clock.epoch_ms(),
            started: clock.now(),
            last_activity_ms: clock.epoch_ms(),
            output_tail: Vec::new(),
            error: None,
        }
    }

    /// Record for a child that failed to start at all.
    pub fn spawn_failed(
        argv: Vec<String>,
        repo_key: Option<RepoKey>,
        error: impl Into<String>,
        clock: &(impl Clock + ?Sized),
    ) -> Self {
        Self {
            pid: 0,
            ppid: std::process::id(),
            pgid: 0,
            argv,
            repo_key,
            status: ProcessStatus::SpawnError,
            started_at_ms: clock.epoch_ms(),
            started: clock.now(),
            last_activity_ms: clock.epoch_ms(),
            output_tail: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Note an output line: refreshes the activity instant and rolls the
    /// bounded tail.
    pub fn push_output_line(&mut self, line: String, clock: &(impl Clock + ?Sized)) {
        self.last_activity_ms = clock.epoch_ms();
        if self.output_tail.len() == OUTPUT_TAIL_CAP {
            self.output_tail.remove(0);
        }
        self.output_tail.push(line);
    }

    pub fn runtime(&self, clock: &(impl Clock + ?Sized)) -> Duration {
        clock.now().saturating_duration_since(self.started)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
