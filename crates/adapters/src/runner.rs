// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process runner.
//!
//! Spawns external tools in their own process group, captures stdout and
//! stderr merged as line-oriented output, enforces optional wall-clock
//! and I/O-inactivity timeouts, and guarantees that every child is
//! reaped and its record finalized on every exit path. Argv is redacted
//! once, on entry; nothing downstream ever sees the raw form.

use crate::output::{CapturedOutput, OutputCaps};
use crate::table::ProcessTable;
use async_trait::async_trait;
use rc_core::{ChildProcessRecord, Clock, ProcessStatus, RedactionSink, RepoKey};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// One tool invocation.
#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Program and arguments; `argv[0]` is the program.
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Extra environment, merged over the inherited one.
    pub env: Vec<(String, String)>,
    /// Owning repo, threaded into the process record for observability
    /// and the per-repo mutual-exclusion check.
    pub repo_key: Option<RepoKey>,
    /// Place the child in a new process group so one signal reaches the
    /// whole subtree. On for every workload of interest.
    pub new_process_group: bool,
    /// Kill the group when the child runs longer than this.
    pub wall_timeout: Option<Duration>,
    /// Kill the group when no output arrives for this long.
    pub inactivity_timeout: Option<Duration>,
    /// Classify success independent of the exit code. `None` means
    /// plain `code == 0`.
    pub success: Option<fn(i32, &CapturedOutput) -> bool>,
}

impl RunSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            cwd: None,
            env: Vec::new(),
            repo_key: None,
            new_process_group: true,
            wall_timeout: None,
            inactivity_timeout: None,
            success: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn repo_key(mut self, key: RepoKey) -> Self {
        self.repo_key = Some(key);
        self
    }

    pub fn wall_timeout(mut self, timeout: Duration) -> Self {
        self.wall_timeout = Some(timeout);
        self
    }

    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = Some(timeout);
        self
    }
}

/// Result of one tool invocation. Failures are data, not errors: a
/// spawn that never started still produces an outcome.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: ProcessStatus,
    pub output: CapturedOutput,
    pub runtime: Duration,
    pub pid: u32,
    /// Exit-code success, or the [`RunSpec`] predicate when one was
    /// given. Killed, stalled and unspawnable children are never
    /// successful.
    pub success: bool,
}

/// Runner tuning shared by every invocation.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub caps: OutputCaps,
    /// Grace between TERM and KILL when a group must die.
    pub kill_grace: Duration,
    /// Timeout-check cadence during capture.
    pub poll_interval: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            caps: OutputCaps::default(),
            kill_grace: Duration::from_secs(10),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Seam between the engine and the operating system. The production
/// implementation is [`ProcessRunner`]; tests script a fake.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, spec: RunSpec) -> RunOutcome;
}

/// Spawns and supervises real child processes.
#[derive(Clone)]
pub struct ProcessRunner {
    table: ProcessTable,
    redactor: RedactionSink,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(
        table: ProcessTable,
        redactor: RedactionSink,
        clock: Arc<dyn Clock>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            table,
            redactor,
            clock,
            config,
        }
    }

    pub fn table(&self) -> &ProcessTable {
        &self.table
    }

    async fn run_spec(&self, spec: RunSpec) -> RunOutcome {
        let display_argv = self.redactor.redact_argv(&spec.argv);
        let started = self.clock.now();

        let Some((program, args)) = spec.argv.split_first() else {
            return self.spawn_failure(Vec::new(), &spec, "empty argv", started);
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        if spec.new_process_group {
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return self.spawn_failure(display_argv, &spec, e.to_string(), started);
            }
        };

        let pid = child.id().unwrap_or(0);
        let pgid = if spec.new_process_group { pid } else { 0 };
        debug!(pid, argv = ?display_argv, "child spawned");

        self.table.register(ChildProcessRecord::new(
            pid,
            pgid,
            display_argv.clone(),
            spec.repo_key.clone(),
            self.clock.as_ref(),
        ));

        let (lines, killed_as) = self.capture(&mut child, pid, &spec, started).await;

        let status = match killed_as {
            Some(kill_status) => {
                self.terminate_group(&mut child, pgid).await;
                kill_status
            }
            None => match child.wait().await {
                Ok(exit) => classify_exit(exit),
                Err(e) => {
                    warn!(pid, error = %e, "wait failed after capture");
                    ProcessStatus::Exited { code: -1 }
                }
            },
        };

        let output = CapturedOutput::truncate(lines, self.config.caps);
        let success = match status {
            ProcessStatus::Exited { code } => match spec.success {
                Some(judge) => judge(code, &output),
                None => code == 0,
            },
            _ => false,
        };

        self.table.finalize(pid, status);
        debug!(pid, %status, success, "child finished");

        RunOutcome {
            status,
            output,
            runtime: self.clock.now().saturating_duration_since(started),
            pid,
            success,
        }
    }

    /// Read merged stdout/stderr until EOF, a timeout, or child death.
    /// Returns all raw lines plus the kill classification, if any.
    async fn capture(
        &self,
        child: &mut Child,
        pid: u32,
        spec: &RunSpec,
        started: Instant,
    ) -> (Vec<String>, Option<ProcessStatus>) {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let mut lines = Vec::new();
        let mut out_partial = String::new();
        let mut err_partial = String::new();
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut out_done = stdout.is_none();
        let mut err_done = stderr.is_none();
        let mut last_activity = self.clock.now();

        while !out_done || !err_done {
            tokio::select! {
                result = read_some(&mut stdout, &mut out_buf), if !out_done => {
                    match result {
                        Some(chunk) => {
                            last_activity = self.clock.now();
                            drain_lines(&mut out_partial, &chunk, |line| {
                                self.table.note_output(pid, &line, self.clock.as_ref());
                                lines.push(line);
                            });
                        }
                        None => out_done = true,
                    }
                }
                result = read_some(&mut stderr, &mut err_buf), if !err_done => {
                    match result {
                        Some(chunk) => {
                            last_activity = self.clock.now();
                            drain_lines(&mut err_partial, &chunk, |line| {
                                self.table.note_output(pid, &line, self.clock.as_ref());
                                lines.push(line);
                            });
                        }
                        None => err_done = true,
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let now = self.clock.now();
            if let Some(wall) = spec.wall_timeout {
                if now.saturating_duration_since(started) >= wall {
                    warn!(pid, timeout_secs = wall.as_secs(), "wall-clock timeout, killing group");
                    flush_partials(&mut out_partial, &mut err_partial, &mut lines);
                    return (lines, Some(ProcessStatus::TimedOut));
                }
            }
            if let Some(idle) = spec.inactivity_timeout {
                if now.saturating_duration_since(last_activity) >= idle {
                    warn!(pid, idle_secs = idle.as_secs(), "no output, killing group as stalled");
                    flush_partials(&mut out_partial, &mut err_partial, &mut lines);
                    return (lines, Some(ProcessStatus::Stalled));
                }
            }
        }

        flush_partials(&mut out_partial, &mut err_partial, &mut lines);
        (lines, None)
    }

    /// TERM the group, give it the grace period, then KILL survivors.
    /// The child is always reaped before this returns.
    async fn terminate_group(&self, child: &mut Child, pgid: u32) {
        signal_group(pgid, GroupSignal::Term);
        let reaped = tokio::time::timeout(self.config.kill_grace, child.wait()).await;
        if reaped.is_err() {
            signal_group(pgid, GroupSignal::Kill);
            let _ = child.wait().await;
        }
    }

    fn spawn_failure(
        &self,
        display_argv: Vec<String>,
        spec: &RunSpec,
        error: impl Into<String>,
        started: Instant,
    ) -> RunOutcome {
        let error = error.into();
        warn!(argv = ?display_argv, error = %error, "spawn failed");
        self.table
            .register_spawn_failure(ChildProcessRecord::spawn_failed(
                display_argv,
                spec.repo_key.clone(),
                error,
                self.clock.as_ref(),
            ));
        RunOutcome {
            status: ProcessStatus::SpawnError,
            output: CapturedOutput::default(),
            runtime: self.clock.now().saturating_duration_since(started),
            pid: 0,
            success: false,
        }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, spec: RunSpec) -> RunOutcome {
        self.run_spec(spec).await
    }
}

/// Read a chunk from an optional stream; `None` on EOF or read error.
async fn read_some<R>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let stream = reader.as_mut()?;
    match stream.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
    }
}

/// Append a chunk to the partial-line buffer and emit completed lines.
fn drain_lines(partial: &mut String, chunk: &str, mut emit: impl FnMut(String)) {
    partial.push_str(chunk);
    while let Some(newline) = partial.find('\n') {
        let mut line: String = partial.drain(..=newline).collect();
        line.truncate(line.trim_end_matches(['\n', '\r']).len());
        emit(line);
    }
}

fn flush_partials(out: &mut String, err: &mut String, lines: &mut Vec<String>) {
    for partial in [out, err] {
        if !partial.is_empty() {
            lines.push(std::mem::take(partial));
        }
    }
}

fn classify_exit(exit: std::process::ExitStatus) -> ProcessStatus {
    match exit.code() {
        Some(code) => ProcessStatus::Exited { code },
        None => signalled_status(exit),
    }
}

#[cfg(unix)]
fn signalled_status(exit: std::process::ExitStatus) -> ProcessStatus {
    use std::os::unix::process::ExitStatusExt;
    ProcessStatus::Signalled {
        signal: exit.signal().unwrap_or(0),
    }
}

#[cfg(not(unix))]
fn signalled_status(_exit: std::process::ExitStatus) -> ProcessStatus {
    ProcessStatus::Exited { code: -1 }
}

/// Signals the lifecycle manager sends to tracked groups at shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    Term,
    Kill,
}

/// Signal a whole process group. Best-effort: the group may already be
/// gone, which is fine.
pub fn signal_group(pgid: u32, sig: GroupSignal) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if pgid == 0 {
            return;
        }
        let sig = match sig {
            GroupSignal::Term => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        let _ = killpg(Pid::from_raw(pgid as i32), sig);
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, sig);
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
