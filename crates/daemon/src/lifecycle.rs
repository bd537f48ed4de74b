// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup, the shared process-wide context, and graceful shutdown.
//!
//! Shutdown order matters: block new spawns first, TERM every tracked
//! process group, give them the grace period, KILL survivors, and only
//! then let the process exit. The shared tables stay alive until the
//! children are reaped.

use crate::env::DaemonEnv;
use parking_lot::{Mutex, RwLock};
use rc_adapters::{
    signal_group, GroupSignal, ProcessRunner, ProcessTable, RunnerConfig,
};
use rc_core::{Clock, JobId, RedactionSink, RepoKey, SystemClock};
use rc_engine::{ConversionGate, ConversionWorker, WorkerConfig};
use rc_manifest::{ManifestError, RepoStore, Settings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

/// How long TERMed process groups get before KILL.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("serve root {path} is not usable: {source}")]
    ServeRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Registry entry for one in-flight conversion job.
#[derive(Debug, Clone)]
pub struct RunningJob {
    pub job_id: JobId,
    pub started_at_ms: u64,
}

/// Process-wide context threaded into every component.
pub struct Context {
    pub env: DaemonEnv,
    pub clock: Arc<dyn Clock>,
    pub redactor: RedactionSink,
    pub table: ProcessTable,
    pub worker: ConversionWorker,
    pub gate: ConversionGate,
    store: RwLock<Arc<RepoStore>>,
    pub jobs: Mutex<HashMap<RepoKey, RunningJob>>,
    /// Earliest next conversion per repo, from `fetch_interval`.
    pub next_fetch: Mutex<HashMap<RepoKey, Instant>>,
    pub cycle: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Context {
    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Set the shutdown flag. Safe to call repeatedly; the second and
    /// later calls are no-ops.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// A receiver for tasks that need to wake on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Current store snapshot.
    pub fn store(&self) -> Arc<RepoStore> {
        self.store.read().clone()
    }
}

/// Environment-derived defaults that sit below the manifest's own
/// `global` section in the merge order.
fn manifest_base(env: &DaemonEnv) -> Settings {
    Settings {
        max_retries: Some(env.max_retries),
        ..Settings::default()
    }
}

/// Build the context: serve root, manifest, gate, runner, worker.
/// Failures here are fatal; the supervisor exits non-zero.
pub fn startup(env: DaemonEnv) -> Result<Arc<Context>, LifecycleError> {
    startup_inner(env, None)
}

/// Same assembly with the tool runner swapped for a scripted fake.
#[cfg(test)]
pub(crate) fn startup_with_runner(
    env: DaemonEnv,
    runner: Arc<dyn rc_adapters::ToolRunner>,
) -> Result<Arc<Context>, LifecycleError> {
    startup_inner(env, Some(runner))
}

fn startup_inner(
    env: DaemonEnv,
    runner_override: Option<Arc<dyn rc_adapters::ToolRunner>>,
) -> Result<Arc<Context>, LifecycleError> {
    std::fs::create_dir_all(&env.serve_root).map_err(|source| LifecycleError::ServeRoot {
        path: env.serve_root.clone(),
        source,
    })?;

    let redactor = RedactionSink::new();
    let store = RepoStore::load(&env.manifest_path, &redactor, &manifest_base(&env))?;
    for warning in rc_manifest::lint(&store) {
        warn!(warning = warning.as_str(), "manifest lint");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let table = ProcessTable::new();
    let runner: Arc<dyn rc_adapters::ToolRunner> = match runner_override {
        Some(runner) => runner,
        None => Arc::new(ProcessRunner::new(
            table.clone(),
            redactor.clone(),
            clock.clone(),
            RunnerConfig {
                caps: env.output_caps,
                ..RunnerConfig::default()
            },
        )),
    };

    let gate = ConversionGate::new(env.global_cap, env.per_server_cap);
    for server in store.servers() {
        gate.configure_server(&server.server_key, server.max_concurrent);
    }

    let worker = ConversionWorker::new(
        runner,
        table.clone(),
        clock.clone(),
        WorkerConfig::new(&env.serve_root),
    );

    info!(
        repos = store.len(),
        manifest = %env.manifest_path.display(),
        serve_root = %env.serve_root.display(),
        "manifest loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    Ok(Arc::new(Context {
        env,
        clock,
        redactor,
        table,
        worker,
        gate,
        store: RwLock::new(Arc::new(store)),
        jobs: Mutex::new(HashMap::new()),
        next_fetch: Mutex::new(HashMap::new()),
        cycle: AtomicU64::new(0),
        shutdown_tx,
        shutdown_rx,
    }))
}

/// Reload the manifest for a new cycle. On failure the previous
/// snapshot is retained and a warning emitted; a running supervisor
/// never dies to a config edit.
pub fn reload_store(ctx: &Context) {
    match RepoStore::load(
        &ctx.env.manifest_path,
        &ctx.redactor,
        &manifest_base(&ctx.env),
    ) {
        Ok(store) => {
            for server in store.servers() {
                ctx.gate.configure_server(&server.server_key, server.max_concurrent);
            }
            for warning in rc_manifest::lint(&store) {
                warn!(warning = warning.as_str(), "manifest lint");
            }
            *ctx.store.write() = Arc::new(store);
        }
        Err(e) => {
            warn!(error = %e, "manifest reload failed; keeping previous snapshot");
        }
    }
}

/// Drain the supervisor: stop spawns, TERM tracked groups, wait out the
/// grace period, KILL survivors, then wait for the tables to empty.
pub async fn shutdown(ctx: &Context, grace: Duration) {
    ctx.request_shutdown();

    let pgids = ctx.table.live_pgids();
    info!(groups = pgids.len(), "shutdown: signalling tracked process groups");
    for pgid in &pgids {
        signal_group(*pgid, GroupSignal::Term);
    }

    let deadline = tokio::time::Instant::now() + grace;
    while ctx.table.live_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let survivors = ctx.table.live_pgids();
    if !survivors.is_empty() {
        warn!(groups = survivors.len(), "shutdown grace expired, sending KILL");
        for pgid in &survivors {
            signal_group(*pgid, GroupSignal::Kill);
        }
        // KILL is not refusable; the reapers just need a moment.
        let kill_deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while ctx.table.live_count() > 0 && tokio::time::Instant::now() < kill_deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    // Let job tasks observe their dead children and deregister.
    let jobs_deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !ctx.jobs.lock().is_empty() && tokio::time::Instant::now() < jobs_deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    info!(
        remaining_children = ctx.table.live_count(),
        remaining_jobs = ctx.jobs.lock().len(),
        "shutdown complete"
    );
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
