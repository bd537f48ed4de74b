// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-cycle scheduler.
//!
//! Each tick reloads the store and walks the repos in declaration
//! order. A repo runs when shutdown is not requested, its fetch
//! interval has elapsed, no job already holds its key, and both gate
//! slots are free. Everything else is skipped with one debug line; the
//! loop never waits for a job.

use crate::lifecycle::{self, Context, RunningJob};
use rc_core::{Clock, ConversionJob, JobId, RepoDescriptor, RepoKey, VcsType};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// What one cycle did, for logging and for bounded-cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub cycle: u64,
    pub considered: usize,
    pub spawned: usize,
    pub skipped: usize,
}

/// Removes the job-registry entry when the job task ends, even if it
/// panics; the repo key must never stay claimed by a dead task.
struct JobGuard {
    ctx: Arc<Context>,
    key: RepoKey,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.ctx.jobs.lock().remove(&self.key);
    }
}

/// Run one scheduling cycle: reload the store, spawn every eligible
/// repo, return the stats.
pub async fn run_cycle(ctx: &Arc<Context>) -> CycleStats {
    let cycle = ctx.cycle.fetch_add(1, Ordering::SeqCst) + 1;
    // Job tasks spawned below inherit this span, so their events carry
    // the cycle counter too.
    let _span = tracing::info_span!("cycle", cycle).entered();
    lifecycle::reload_store(ctx);
    let store = ctx.store();

    let mut stats = CycleStats {
        cycle,
        considered: 0,
        spawned: 0,
        skipped: 0,
    };

    info!(cycle, repos = store.len(), "cycle start");

    for repo in store.iter() {
        stats.considered += 1;

        if ctx.shutdown_requested() {
            debug!(cycle, repo_key = %repo.repo_key, "skip: shutdown requested");
            stats.skipped += 1;
            continue;
        }
        if repo.vcs != VcsType::Svn {
            debug!(cycle, repo_key = %repo.repo_key, vcs = %repo.vcs, "skip: unsupported type");
            stats.skipped += 1;
            continue;
        }
        if let Some(next) = ctx.next_fetch.lock().get(&repo.repo_key) {
            if ctx.clock.now() < *next {
                debug!(cycle, repo_key = %repo.repo_key, "skip: fetch interval not elapsed");
                stats.skipped += 1;
                continue;
            }
        }
        if ctx.jobs.lock().contains_key(&repo.repo_key) {
            debug!(cycle, repo_key = %repo.repo_key, "skip: job already running");
            stats.skipped += 1;
            continue;
        }
        let Some(token) = ctx.gate.try_acquire(&repo.server_key) else {
            debug!(
                cycle,
                repo_key = %repo.repo_key,
                server_key = %repo.server_key,
                "skip: no free slots"
            );
            stats.skipped += 1;
            continue;
        };

        spawn_job(ctx, repo.clone(), token, cycle);
        stats.spawned += 1;
    }

    info!(
        cycle,
        spawned = stats.spawned,
        skipped = stats.skipped,
        "cycle complete"
    );
    stats
}

/// Spawn one conversion job task. The slot token and registry guard
/// travel into the task; both release on any exit path, strictly after
/// the worker (and thus the reaper) has finished.
fn spawn_job(ctx: &Arc<Context>, repo: RepoDescriptor, token: rc_engine::SlotToken, cycle: u64) {
    let job_id = JobId::random();
    ctx.jobs.lock().insert(
        repo.repo_key.clone(),
        RunningJob {
            job_id: job_id.clone(),
            started_at_ms: ctx.clock.epoch_ms(),
        },
    );

    info!(
        cycle,
        repo_key = %repo.repo_key,
        server_key = %repo.server_key,
        job_id = %job_id,
        "starting conversion job"
    );

    let ctx = Arc::clone(ctx);
    let task = async move {
        let guard = JobGuard {
            ctx: Arc::clone(&ctx),
            key: repo.repo_key.clone(),
        };
        let shutdown = ctx.shutdown_signal();

        let job = ctx.worker.convert(&repo, shutdown).await;
        record_outcome(&ctx, &repo, &job);

        // Slot release happens after the worker returned, which is
        // after every child of this job was reaped.
        drop(guard);
        drop(token);
    };
    tokio::spawn(task.instrument(tracing::Span::current()));
}

/// Log the terminal state and advance `next_fetch_time` on success.
fn record_outcome(ctx: &Context, repo: &RepoDescriptor, job: &ConversionJob) {
    let outcome = job.outcome();
    match outcome {
        Some(outcome) if outcome.is_success() => {
            if let Some(interval) = repo.fetch_interval {
                ctx.next_fetch
                    .lock()
                    .insert(repo.repo_key.clone(), ctx.clock.now() + interval);
            }
            info!(
                repo_key = %repo.repo_key,
                job_id = %job.id,
                outcome = %outcome,
                retries = job.retries,
                rev_before = ?job.rev_before,
                rev_after = ?job.rev_after,
                "job finished"
            );
        }
        Some(outcome) => {
            warn!(
                repo_key = %repo.repo_key,
                job_id = %job.id,
                outcome = %outcome,
                retries = job.retries,
                error = ?job.last_error,
                "job failed"
            );
        }
        None => {
            // The worker always finishes the job; a non-terminal state
            // here is a bug worth shouting about, not panicking over.
            warn!(repo_key = %repo.repo_key, job_id = %job.id, state = %job.state, "job ended non-terminal");
        }
    }
}

#[cfg(test)]
#[path = "sched_tests.rs"]
mod tests;
