// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-repo conversion worker: phases A through I.
//!
//! Each attempt re-runs probe → local state → up-to-date check → fetch →
//! assessment, because credentials and URLs rotate between attempts.
//! Failures are data: the worker's top level is a retry loop over tagged
//! outcomes, and nothing here can take the supervisor down.

use crate::assess::{assess, FetchAssessment};
use crate::maintenance;
use crate::progress::{killed_by_runner, ConversionState};
use rand::Rng;
use rc_adapters::{git, svn, ProcessTable, RunSpec, ToolRunner};
use rc_core::{Clock, ConversionJob, JobOutcome, JobState, RepoDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Git config key recording the layout the clone was initialised with.
/// Compared against the manifest each run to detect layout changes that
/// invalidate the tool's branches/tags scan metadata.
const LAYOUT_CONFIG_KEY: &str = "repoconv.layout";

/// Worker tuning shared across repos.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub serve_root: PathBuf,
    /// Wall clock on every probe; a hung probe blocks a slot.
    pub probe_timeout: Duration,
    /// I/O-inactivity timeout applied to fetches of repos that opted in.
    pub inactivity_timeout: Duration,
    /// First backoff step; doubles per retry.
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl WorkerConfig {
    pub fn new(serve_root: impl Into<PathBuf>) -> Self {
        Self {
            serve_root: serve_root.into(),
            probe_timeout: svn::DEFAULT_PROBE_TIMEOUT,
            inactivity_timeout: Duration::from_secs(600),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
        }
    }
}

/// What a failed attempt should do to the batch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowPolicy {
    /// Stall/timeout/transient: a smaller batch may get through.
    Halve,
    /// Auth and unknown failures: batch size is not the problem.
    Keep,
}

/// Drives conversions for one supervisor.
pub struct ConversionWorker {
    runner: Arc<dyn ToolRunner>,
    table: ProcessTable,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl ConversionWorker {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        table: ProcessTable,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            runner,
            table,
            clock,
            config,
        }
    }

    /// Convert one repo to completion. Always returns a finished job.
    pub async fn convert(
        &self,
        repo: &RepoDescriptor,
        mut shutdown: watch::Receiver<bool>,
    ) -> ConversionJob {
        let mut job = ConversionJob::new(
            repo.repo_key.clone(),
            repo.server_key.clone(),
            repo.fetch_batch_size,
            self.clock.as_ref(),
        );
        let git_dir = repo.clone_dir(&self.config.serve_root);

        loop {
            if *shutdown.borrow() {
                job.finish(JobOutcome::Interrupted);
                break;
            }

            // Phase A: probe the remote.
            job.transition(JobState::Probing);
            let Some(probe) = self.probe(repo).await else {
                if !self.retry_or_fail(repo, &mut job, "probe failed", WindowPolicy::Keep, &mut shutdown).await {
                    break;
                }
                continue;
            };
            debug!(
                repo_key = %repo.repo_key,
                revision = probe.revision,
                last_changed_rev = probe.last_changed_rev,
                "probe complete"
            );

            // Phase B: local state.
            let creating = !git_dir.exists();
            let state = if creating {
                ConversionState::default()
            } else {
                match ConversionState::read(&git_dir) {
                    Ok(state) => state,
                    Err(e) => {
                        error!(repo_key = %repo.repo_key, error = %e, "unreadable local state");
                        job.last_error = Some(e.to_string());
                        job.finish(JobOutcome::LocalError);
                        break;
                    }
                }
            };
            let before = state.last_converted_rev;
            job.rev_before = before;

            // Phase C: already up to date? One probe, one stat, one
            // metadata read; the common case must stay this cheap.
            if !creating {
                let layout_changed = self.layout_changed(repo, &git_dir).await;
                if layout_changed {
                    warn!(
                        repo_key = %repo.repo_key,
                        layout = repo.layout.fingerprint(),
                        "configured layout differs from the one recorded at init; ignoring scan metadata"
                    );
                }
                if !layout_changed
                    && before == Some(probe.last_changed_rev)
                    && state.scanned_through(probe.last_changed_rev)
                {
                    info!(repo_key = %repo.repo_key, rev = probe.last_changed_rev, "already up to date");
                    job.rev_after = before;
                    job.finish(JobOutcome::NoWork);
                    break;
                }
            }

            // Phase D: belt-and-suspenders per-repo mutual exclusion on
            // top of the concurrency gate.
            let holders = self.table.live_for_repo(&repo.repo_key, None);
            if !holders.is_empty() {
                warn!(
                    repo_key = %repo.repo_key,
                    holders = ?holders,
                    "another worker already owns this repo"
                );
                job.finish(JobOutcome::AlreadyRunning);
                break;
            }

            // First run: initialise the clone and the git-svn remote.
            if creating {
                job.transition(JobState::Creating);
                match self.bootstrap(repo, &git_dir).await {
                    Ok(()) => {}
                    Err(BootstrapFailure::Local(reason)) => {
                        error!(repo_key = %repo.repo_key, reason = reason.as_str(), "bootstrap local error");
                        job.last_error = Some(reason);
                        job.finish(JobOutcome::LocalError);
                        break;
                    }
                    Err(BootstrapFailure::Tool(reason)) => {
                        if !self.retry_or_fail(repo, &mut job, &reason, WindowPolicy::Keep, &mut shutdown).await {
                            break;
                        }
                        continue;
                    }
                }
            }

            // No converted revision yet: seed the fetch lower bound so
            // `git svn` does not walk up from revision 0 one empty
            // request at a time.
            let revision_floor = if before.is_none() {
                self.first_revision(repo).await
            } else {
                None
            };

            // Phases E+F: fetch with the current log window.
            job.transition(JobState::Fetching);
            info!(
                repo_key = %repo.repo_key,
                log_window = job.log_window,
                revision_floor = ?revision_floor,
                attempt = job.retries + 1,
                "starting fetch"
            );
            let mut spec = RunSpec::new(git::svn_fetch_argv(repo, job.log_window, revision_floor))
                .cwd(&git_dir)
                .repo_key(repo.repo_key.clone());
            if repo.allow_inactivity_timeout {
                spec = spec.inactivity_timeout(self.config.inactivity_timeout);
            }
            let fetch = self.runner.run(spec).await;

            // Phase G: success is observable progress, not exit code.
            if killed_by_runner(fetch.status) {
                let reason = format!("fetch killed: {}", fetch.status);
                if !self.retry_or_fail(repo, &mut job, &reason, WindowPolicy::Halve, &mut shutdown).await {
                    break;
                }
                continue;
            }

            let after = match ConversionState::read(&git_dir) {
                Ok(state) => state.last_converted_rev,
                Err(e) => {
                    error!(repo_key = %repo.repo_key, error = %e, "unreadable state after fetch");
                    job.last_error = Some(e.to_string());
                    job.finish(JobOutcome::LocalError);
                    break;
                }
            };

            match assess(before, after, &fetch.output) {
                FetchAssessment::Progress { before, after } => {
                    info!(
                        repo_key = %repo.repo_key,
                        before,
                        after,
                        "fetch advanced the converted tip"
                    );
                    job.rev_after = Some(after);

                    // Phase H: make the new history visible.
                    job.transition(JobState::Maintaining);
                    let report =
                        maintenance::run(self.runner.as_ref(), repo, &git_dir, creating).await;
                    info!(
                        repo_key = %repo.repo_key,
                        branches = report.branches_promoted,
                        tags = report.tags_promoted,
                        head = ?report.head,
                        gc = report.gc_ran,
                        "maintenance complete"
                    );
                    job.finish(if report.has_warnings() {
                        JobOutcome::DoneWithWarnings
                    } else {
                        JobOutcome::Done
                    });
                }
                FetchAssessment::Transient { token } => {
                    let reason = format!("transient remote failure: {token}");
                    if !self.retry_or_fail(repo, &mut job, &reason, WindowPolicy::Halve, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
                FetchAssessment::AuthFailure { token } => {
                    let reason = format!("authentication failure: {token}");
                    if !self.retry_or_fail(repo, &mut job, &reason, WindowPolicy::Keep, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
                FetchAssessment::Silent => {
                    let reason = if fetch.output.is_empty() {
                        "silent failure: exit without output or progress".to_string()
                    } else {
                        "no progress and no recognisable error".to_string()
                    };
                    if !self.retry_or_fail(repo, &mut job, &reason, WindowPolicy::Keep, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
                FetchAssessment::Corruption { before, after } => {
                    error!(
                        repo_key = %repo.repo_key,
                        before,
                        after,
                        "converted tip moved backwards"
                    );
                    job.last_error =
                        Some(format!("tip regressed from r{before} to r{after}"));
                    job.finish(JobOutcome::Corruption);
                }
            }
            break;
        }

        job
    }

    /// Probe the remote; `None` on any failure (spawn, timeout, parse).
    async fn probe(&self, repo: &RepoDescriptor) -> Option<svn::SvnInfo> {
        let spec = RunSpec::new(svn::info_argv(repo))
            .repo_key(repo.repo_key.clone())
            .wall_timeout(self.config.probe_timeout);
        let outcome = self.runner.run(spec).await;
        if !outcome.success {
            warn!(
                repo_key = %repo.repo_key,
                status = %outcome.status,
                tail = ?outcome.output.lines.last(),
                "probe failed"
            );
            return None;
        }
        match svn::parse_info(&outcome.output.lines) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(repo_key = %repo.repo_key, error = %e, "unparsable probe output");
                None
            }
        }
    }

    /// Create the clone directory, init the git-svn remote, record the
    /// layout, and wire up the optional ignore file.
    async fn bootstrap(
        &self,
        repo: &RepoDescriptor,
        git_dir: &Path,
    ) -> Result<(), BootstrapFailure> {
        info!(repo_key = %repo.repo_key, dir = %git_dir.display(), "first run, initialising clone");

        std::fs::create_dir_all(git_dir)
            .map_err(|e| BootstrapFailure::Local(format!("creating {}: {e}", git_dir.display())))?;

        let init = self
            .runner
            .run(
                RunSpec::new(git::svn_init_argv(repo))
                    .cwd(git_dir)
                    .repo_key(repo.repo_key.clone()),
            )
            .await;
        if !init.success {
            return Err(BootstrapFailure::Tool(format!(
                "git svn init failed: {}",
                init.status
            )));
        }

        if repo.bare_clone {
            let outcome = self
                .runner
                .run(
                    RunSpec::new(git::config_set_argv("core.bare", "true"))
                        .cwd(git_dir)
                        .repo_key(repo.repo_key.clone()),
                )
                .await;
            if !outcome.success {
                return Err(BootstrapFailure::Tool("setting core.bare failed".to_string()));
            }
        }

        let outcome = self
            .runner
            .run(
                RunSpec::new(git::config_set_argv(
                    LAYOUT_CONFIG_KEY,
                    &repo.layout.fingerprint(),
                ))
                .cwd(git_dir)
                .repo_key(repo.repo_key.clone()),
            )
            .await;
        if !outcome.success {
            return Err(BootstrapFailure::Tool("recording layout failed".to_string()));
        }

        if let Some(ignore_file) = &repo.git_ignore_file {
            let exclude = git_dir.join("info/exclude");
            let copied = std::fs::create_dir_all(git_dir.join("info"))
                .and_then(|()| std::fs::copy(ignore_file, &exclude));
            if let Err(e) = copied {
                warn!(
                    repo_key = %repo.repo_key,
                    ignore_file = %ignore_file.display(),
                    error = %e,
                    "could not install ignore file"
                );
            }
        }

        Ok(())
    }

    /// Oldest real revision of the subtree, for the bootstrap fetch
    /// floor. Best-effort: `None` just means a slower first fetch.
    async fn first_revision(&self, repo: &RepoDescriptor) -> Option<u64> {
        let spec = RunSpec::new(svn::first_rev_argv(repo))
            .repo_key(repo.repo_key.clone())
            .wall_timeout(self.config.probe_timeout);
        let outcome = self.runner.run(spec).await;
        if !outcome.success {
            return None;
        }
        let first = svn::parse_first_rev(&outcome.output.lines);
        debug!(repo_key = %repo.repo_key, first_rev = ?first, "seeded fetch floor");
        first
    }

    /// Whether the manifest layout differs from the one recorded at
    /// init. Missing recording (pre-existing clones) counts as
    /// unchanged.
    async fn layout_changed(&self, repo: &RepoDescriptor, git_dir: &Path) -> bool {
        let spec = RunSpec::new(git::config_get_argv(LAYOUT_CONFIG_KEY))
            .cwd(git_dir)
            .repo_key(repo.repo_key.clone());
        let outcome = self.runner.run(spec).await;
        if !outcome.success {
            return false;
        }
        match outcome.output.lines.first() {
            Some(recorded) => recorded.trim() != repo.layout.fingerprint(),
            None => false,
        }
    }

    /// Record a failed attempt. Returns `false` when the job is now
    /// terminal (retries exhausted or shutdown arrived during backoff).
    async fn retry_or_fail(
        &self,
        repo: &RepoDescriptor,
        job: &mut ConversionJob,
        reason: &str,
        window: WindowPolicy,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        if *shutdown.borrow() {
            job.finish(JobOutcome::Interrupted);
            return false;
        }
        let retries = job.record_retry(reason);
        if retries > repo.max_retries {
            error!(
                repo_key = %repo.repo_key,
                retries,
                max_retries = repo.max_retries,
                reason,
                "retries exhausted"
            );
            job.finish(JobOutcome::PermanentFailure);
            return false;
        }

        if window == WindowPolicy::Halve {
            let new_window = job.halve_window();
            info!(repo_key = %repo.repo_key, log_window = new_window, "halving log window for retry");
        }

        let wait = self.backoff_delay(retries);
        warn!(
            repo_key = %repo.repo_key,
            retries,
            wait_ms = wait.as_millis() as u64,
            reason,
            "attempt failed, backing off"
        );
        job.transition(JobState::RetryWait);

        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    job.finish(JobOutcome::Interrupted);
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Exponential backoff with a small random jitter so a fleet of
    /// failing repos does not retry in lockstep.
    fn backoff_delay(&self, retries: u32) -> Duration {
        let base = self.config.backoff_base;
        let exp = base.saturating_mul(1u32 << (retries - 1).min(16));
        let capped = exp.min(self.config.backoff_cap);
        let jitter_ms = rand::rng().random_range(0..=base.as_millis() as u64 / 2);
        capped + Duration::from_millis(jitter_ms)
    }
}

enum BootstrapFailure {
    /// Filesystem problem; not retriable.
    Local(String),
    /// Tool invocation failed; retriable per policy.
    Tool(String),
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
