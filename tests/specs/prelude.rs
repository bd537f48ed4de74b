//! Test helpers for behavioral specifications.
//!
//! A thin DSL around the `rcd` binary: build an environment in a temp
//! directory, run a bounded number of cycles, assert on the outcome.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;

/// Returns the path to the rcd binary. Falls back to resolving
/// relative to the test binary itself (target/debug/deps/specs-<hash>,
/// whose grandparent is where rcd is built) when cargo metadata is
/// stale.
pub fn rcd_binary() -> PathBuf {
    let resolved = assert_cmd::cargo::cargo_bin("rcd");
    if resolved.exists() {
        return resolved;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let candidate = debug_dir.join("rcd");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    resolved
}

/// One supervisor fixture: manifest + serve root in a temp dir.
pub struct Supervisor {
    dir: TempDir,
    env: Vec<(String, String)>,
}

impl Supervisor {
    pub fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("repos-to-convert.yaml"), manifest).unwrap();
        let env = vec![
            (
                "REPOS_TO_CONVERT".to_string(),
                dir.path().join("repos-to-convert.yaml").display().to_string(),
            ),
            (
                "SRC_SERVE_ROOT".to_string(),
                dir.path().join("serve-root").display().to_string(),
            ),
            // One quick cycle unless the spec overrides.
            ("MAX_CYCLES".to_string(), "1".to_string()),
            ("MAX_RETRIES".to_string(), "0".to_string()),
            ("LOG_LEVEL".to_string(), "debug".to_string()),
        ];
        Self { dir, env }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.retain(|(k, _)| k != key);
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Build the command without running it (for spawn-based specs).
    pub fn command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(rcd_binary());
        cmd.envs(self.env.iter().map(|(k, v)| (k, v)));
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd
    }

    /// Run to completion and wrap the output for assertions.
    pub fn run(&self) -> RunResult {
        let output = self.command().output().unwrap();
        RunResult { output }
    }
}

pub struct RunResult {
    output: Output,
}

impl RunResult {
    pub fn passes(self) -> Self {
        assert!(
            self.output.status.success(),
            "expected success, got {:?}\nstdout:\n{}\nstderr:\n{}",
            self.output.status.code(),
            self.stdout(),
            self.stderr()
        );
        self
    }

    pub fn fails(self) -> Self {
        assert!(
            !self.output.status.success(),
            "expected failure, got success\nstdout:\n{}",
            self.stdout()
        );
        self
    }

    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, needle: &str) -> Self {
        assert!(
            self.stdout().contains(needle),
            "stdout missing '{needle}':\n{}",
            self.stdout()
        );
        self
    }

    pub fn stdout_lacks(self, needle: &str) -> Self {
        assert!(
            !self.stdout().contains(needle),
            "stdout unexpectedly contains '{needle}':\n{}",
            self.stdout()
        );
        self
    }

    pub fn stderr_has(self, needle: &str) -> Self {
        assert!(
            self.stderr().contains(needle),
            "stderr missing '{needle}':\n{}",
            self.stderr()
        );
        self
    }

    /// Every non-empty stdout line must parse as a JSON object.
    pub fn stdout_is_json_lines(self) -> Self {
        for line in self.stdout().lines().filter(|l| !l.trim().is_empty()) {
            let parsed: Result<serde_json::Value, _> = serde_json::from_str(line);
            assert!(
                parsed.map(|v| v.is_object()).unwrap_or(false),
                "stdout line is not a JSON object: {line}"
            );
        }
        self
    }
}
