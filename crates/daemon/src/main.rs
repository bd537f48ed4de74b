// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! repoconv daemon (rcd)
//!
//! Long-running supervisor that converts remote Subversion repositories
//! into locally-hosted bare Git repositories on shared storage.
//!
//! Architecture:
//! - Main loop: periodic scheduling cycles, interruptible by signals
//! - Job tasks: one per in-flight repo conversion, owning its children
//! - Monitors: periodic status and concurrency snapshots

use rc_daemon::{env::DaemonEnv, lifecycle, monitor, sched};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() {
    // Handle info flags before touching config or the filesystem.
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("rcd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("rcd {}", env!("CARGO_PKG_VERSION"));
                println!("repoconv daemon - converts SVN repositories to bare Git clones");
                println!();
                println!("USAGE:");
                println!("    rcd");
                println!();
                println!("All control is via environment variables and the YAML manifest");
                println!("named by REPOS_TO_CONVERT (default /sg/repos-to-convert.yaml).");
                println!("Send TERM, INT or HUP for a graceful shutdown.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return;
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: rcd [--help | --version]");
                std::process::exit(2);
            }
        }
    }

    let env = DaemonEnv::load();
    setup_logging(&env);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        container = hostname().as_str(),
        build = ?env.build_metadata,
        "starting repoconv supervisor"
    );

    let ctx = match lifecycle::startup(env) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = %e, "failed to start");
            eprintln!("rcd: failed to start: {e}");
            std::process::exit(1);
        }
    };

    // Root span: every event below carries the container identity.
    let root = tracing::info_span!("rcd", container = %hostname());
    {
        let _enter = root.enter();
        monitor::spawn_status_monitor(Arc::clone(&ctx));
        monitor::spawn_concurrency_monitor(Arc::clone(&ctx));
    }

    if let Err(e) = run(&ctx).instrument(root.clone()).await {
        error!(error = %e, "signal handling unavailable");
        eprintln!("rcd: {e}");
        std::process::exit(1);
    }

    lifecycle::shutdown(&ctx, lifecycle::SHUTDOWN_GRACE)
        .instrument(root)
        .await;
    info!("supervisor stopped");
}

/// The main loop: cycles on a fixed tick until a shutdown signal or the
/// bounded-cycle budget ends the run.
async fn run(ctx: &Arc<lifecycle::Context>) -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    // NOTE: created outside the loop - the first tick fires immediately,
    // and re-creating the interval per iteration would reset the cadence
    // on every signal wakeup.
    let mut tick = tokio::time::interval(ctx.env.interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let stats = sched::run_cycle(ctx).await;
                if ctx.env.max_cycles > 0 && stats.cycle >= ctx.env.max_cycles {
                    info!(cycles = stats.cycle, "cycle budget reached, shutting down");
                    return Ok(());
                }
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                return Ok(());
            }
            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                return Ok(());
            }
            _ = sighup.recv() => {
                info!("received SIGHUP, shutting down");
                return Ok(());
            }
        }
    }
}

/// Container identity carried by the root span on every event.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// One JSON object per line on stdout. `RUST_LOG` wins over
/// `LOG_LEVEL` when both are set.
fn setup_logging(env: &DaemonEnv) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env.filter_directive()));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_writer(std::io::stdout),
        )
        .init();
}
