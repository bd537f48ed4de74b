// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background monitors.
//!
//! The status monitor emits one structured event per tracked child on a
//! fixed cadence; the concurrency monitor logs gate occupancy. Both
//! read snapshots only, hold no locks while sampling, and wind down as
//! soon as shutdown is requested.

use crate::lifecycle::Context;
use rc_core::{format_elapsed, Clock, ShortId};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, Instrument};

/// One status event per live child process, every
/// `STATUS_MONITOR_INTERVAL` seconds.
pub fn spawn_status_monitor(ctx: Arc<Context>) -> JoinHandle<()> {
    let mut shutdown = ctx.shutdown_signal();
    let period = ctx.env.status_monitor_interval;

    let task = async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("status monitor stopping");
                        return;
                    }
                    continue;
                }
            }

            // Snapshot first; sampling happens without any lock held.
            let records = ctx.table.live_snapshot();
            for record in records {
                let sample = rc_adapters::procfs::sample(record.pid, ctx.clock.as_ref());
                info!(
                    target: "repoconv::status",
                    pid = record.pid,
                    ppid = record.ppid,
                    pgid = record.pgid,
                    repo_key = record.repo_key.as_ref().map(|k| k.as_str()),
                    argv = ?record.argv,
                    status = %record.status,
                    runtime = %format_elapsed(record.runtime(ctx.clock.as_ref())),
                    proc_state = sample.state.map(String::from),
                    utime_ticks = sample.utime_ticks,
                    stime_ticks = sample.stime_ticks,
                    rss_bytes = sample.rss_bytes,
                    open_fds = sample.open_fds,
                    sockets = sample.sockets,
                    last_activity_ms = record.last_activity_ms,
                    "process status"
                );
            }
        }
    };
    tokio::spawn(task.instrument(tracing::Span::current()))
}

/// Gate occupancy every `CONCURRENCY_MONITOR_INTERVAL` seconds.
pub fn spawn_concurrency_monitor(ctx: Arc<Context>) -> JoinHandle<()> {
    let mut shutdown = ctx.shutdown_signal();
    let period = ctx.env.concurrency_monitor_interval;

    let task = async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("concurrency monitor stopping");
                        return;
                    }
                    continue;
                }
            }

            let snap = ctx.gate.snapshot();
            let jobs = ctx.jobs.lock().len();
            let servers: Vec<String> = snap
                .servers
                .iter()
                .map(|(key, in_use, cap)| format!("{}={in_use}/{cap}", key.as_str().short(40)))
                .collect();
            info!(
                target: "repoconv::concurrency",
                global_in_use = snap.global_in_use,
                global_cap = snap.global_cap,
                running_jobs = jobs,
                servers = ?servers,
                "gate occupancy"
            );
        }
    };
    tokio::spawn(task.instrument(tracing::Span::current()))
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
