// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared table of tracked child processes.
//!
//! The process runner is the single writer while a child lives; the
//! status monitor, the scheduler and shutdown read snapshots. Readers
//! never hold the lock longer than one copy.

use parking_lot::RwLock;
use rc_core::{ChildProcessRecord, Clock, ProcessStatus, RepoKey};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// How many finished records are retained for diagnostics.
const FINISHED_CAP: usize = 256;

#[derive(Default)]
struct TableInner {
    live: HashMap<u32, ChildProcessRecord>,
    finished: VecDeque<ChildProcessRecord>,
}

/// Cloneable handle to the shared table.
#[derive(Clone, Default)]
pub struct ProcessTable {
    inner: Arc<RwLock<TableInner>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly-spawned child.
    pub fn register(&self, record: ChildProcessRecord) {
        let mut inner = self.inner.write();
        inner.live.insert(record.pid, record);
    }

    /// Record a spawn failure directly into the finished table.
    pub fn register_spawn_failure(&self, record: ChildProcessRecord) {
        let mut inner = self.inner.write();
        push_finished(&mut inner.finished, record);
    }

    /// Append an output line to a live record, refreshing its activity.
    pub fn note_output(&self, pid: u32, line: &str, clock: &(impl Clock + ?Sized)) {
        let mut inner = self.inner.write();
        if let Some(record) = inner.live.get_mut(&pid) {
            record.push_output_line(line.to_string(), clock);
        }
    }

    /// Move a live record to the finished table with its final status.
    /// Returns the finalized record, if the pid was tracked.
    pub fn finalize(&self, pid: u32, status: ProcessStatus) -> Option<ChildProcessRecord> {
        let mut inner = self.inner.write();
        let mut record = inner.live.remove(&pid)?;
        record.status = status;
        push_finished(&mut inner.finished, record.clone());
        Some(record)
    }

    /// Snapshot of every live record.
    pub fn live_snapshot(&self) -> Vec<ChildProcessRecord> {
        self.inner.read().live.values().cloned().collect()
    }

    /// Process groups of every live child, for shutdown signalling.
    pub fn live_pgids(&self) -> Vec<u32> {
        let inner = self.inner.read();
        let mut pgids: Vec<u32> = inner.live.values().map(|r| r.pgid).collect();
        pgids.sort_unstable();
        pgids.dedup();
        pgids
    }

    /// Live processes working on `repo_key`, excluding `except_pid`.
    /// The worker's defense-in-depth mutual-exclusion check.
    pub fn live_for_repo(&self, repo_key: &RepoKey, except_pid: Option<u32>) -> Vec<u32> {
        self.inner
            .read()
            .live
            .values()
            .filter(|r| r.repo_key.as_ref() == Some(repo_key))
            .filter(|r| Some(r.pid) != except_pid)
            .map(|r| r.pid)
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.inner.read().live.len()
    }

    /// Most recent finished records, newest last.
    pub fn finished_snapshot(&self) -> Vec<ChildProcessRecord> {
        self.inner.read().finished.iter().cloned().collect()
    }
}

fn push_finished(finished: &mut VecDeque<ChildProcessRecord>, record: ChildProcessRecord) {
    if finished.len() == FINISHED_CAP {
        finished.pop_front();
    }
    finished.push_back(record);
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
