// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Conversion-job state machine.
//!
//! A [`ConversionJob`] is one in-flight attempt to advance one repo. The
//! worker drives it through the states below; everything after
//! `Finished` is immutable history.
//!
//! ```text
//!   NEW → PROBING → (RETRY_WAIT → PROBING)*
//!        → FINISHED(no_work)
//!        → CREATING → FETCHING
//!        → FETCHING → (RETRY_WAIT → FETCHING)*
//!                  → MAINTAINING → FINISHED(done | done_with_warnings)
//!                  → FINISHED(permanent_failure | corruption | ...)
//! ```

use crate::clock::Clock;
use crate::repo::{RepoKey, ServerKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

crate::define_id! {
    /// Unique identifier for one conversion attempt, fresh per spawn.
    pub struct JobId;
}

impl JobId {
    /// Random id for a newly-spawned job.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Live state of a conversion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet running.
    New,
    /// Probing the remote with `svn info`.
    Probing,
    /// Backing off between attempts.
    RetryWait,
    /// First run: initialising the bare repo and the `git svn` remote.
    Creating,
    /// `git svn fetch` in flight.
    Fetching,
    /// Post-fetch ref promotion / HEAD update / GC.
    Maintaining,
    /// Terminal, with the final classification.
    Finished(JobOutcome),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished(_))
    }

    /// States during which the job owns the on-disk git directory.
    pub fn owns_clone_dir(&self) -> bool {
        matches!(
            self,
            JobState::Creating | JobState::Fetching | JobState::Maintaining
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::New => write!(f, "new"),
            JobState::Probing => write!(f, "probing"),
            JobState::RetryWait => write!(f, "retry_wait"),
            JobState::Creating => write!(f, "creating"),
            JobState::Fetching => write!(f, "fetching"),
            JobState::Maintaining => write!(f, "maintaining"),
            JobState::Finished(outcome) => write!(f, "finished:{outcome}"),
        }
    }
}

/// Terminal classification of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Remote tip already converted; nothing to do.
    NoWork,
    /// Fetch made progress and maintenance completed.
    Done,
    /// Fetch made progress; maintenance reported non-fatal problems.
    DoneWithWarnings,
    /// Another worker already owns this repo key.
    AlreadyRunning,
    /// Retries exhausted (probe or fetch).
    PermanentFailure,
    /// Local tip moved backwards; never retried, surfaced loudly.
    Corruption,
    /// Local filesystem problem (permissions, ENOSPC, damaged repo).
    LocalError,
    /// Shutdown arrived mid-job.
    Interrupted,
}

impl JobOutcome {
    /// Whether the repo's `next_fetch_time` should advance as satisfied.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            JobOutcome::NoWork | JobOutcome::Done | JobOutcome::DoneWithWarnings
        )
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::NoWork => write!(f, "no_work"),
            JobOutcome::Done => write!(f, "done"),
            JobOutcome::DoneWithWarnings => write!(f, "done_with_warnings"),
            JobOutcome::AlreadyRunning => write!(f, "already_running"),
            JobOutcome::PermanentFailure => write!(f, "permanent_failure"),
            JobOutcome::Corruption => write!(f, "corruption"),
            JobOutcome::LocalError => write!(f, "local_error"),
            JobOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// One in-flight (or finished) conversion attempt for one repo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub id: JobId,
    pub repo_key: RepoKey,
    pub server_key: ServerKey,
    pub state: JobState,
    pub spawned_at_ms: u64,
    #[serde(skip, default = "Instant::now")]
    spawned_at: Instant,
    /// Failed attempts so far in this job (probe and fetch combined).
    pub retries: u32,
    /// Current `--log-window-size`; halved on stall retries.
    pub log_window: u32,
    /// Last converted revision observed before the current fetch.
    pub rev_before: Option<u64>,
    /// Last converted revision observed after the job finished.
    pub rev_after: Option<u64>,
    pub last_error: Option<String>,
}

impl ConversionJob {
    pub fn new(
        repo_key: RepoKey,
        server_key: ServerKey,
        log_window: u32,
        clock: &(impl Clock + ?Sized),
    ) -> Self {
        Self {
            id: JobId::random(),
            repo_key,
            server_key,
            state: JobState::New,
            spawned_at_ms: clock.epoch_ms(),
            spawned_at: clock.now(),
            retries: 0,
            log_window,
            rev_before: None,
            rev_after: None,
            last_error: None,
        }
    }

    /// Move to a new state. Transitions out of a terminal state are
    /// ignored; the first terminal classification wins.
    pub fn transition(&mut self, state: JobState) {
        if self.state.is_terminal() {
            return;
        }
        self.state = state;
    }

    /// Record a failed attempt and return the new retry count.
    pub fn record_retry(&mut self, error: impl Into<String>) -> u32 {
        self.retries += 1;
        self.last_error = Some(error.into());
        self.retries
    }

    /// Halve the log window for the next attempt, with a floor of 1.
    pub fn halve_window(&mut self) -> u32 {
        self.log_window = (self.log_window / 2).max(1);
        self.log_window
    }

    pub fn finish(&mut self, outcome: JobOutcome) {
        self.transition(JobState::Finished(outcome));
    }

    pub fn outcome(&self) -> Option<JobOutcome> {
        match self.state {
            JobState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn runtime(&self, clock: &(impl Clock + ?Sized)) -> Duration {
        clock.now().saturating_duration_since(self.spawned_at)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
