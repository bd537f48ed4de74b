// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rc_core::SystemClock;

fn runner() -> ProcessRunner {
    runner_with(RunnerConfig {
        kill_grace: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
        ..RunnerConfig::default()
    })
}

fn runner_with(config: RunnerConfig) -> ProcessRunner {
    ProcessRunner::new(
        ProcessTable::new(),
        RedactionSink::new(),
        Arc::new(SystemClock),
        config,
    )
}

fn sh(script: &str) -> RunSpec {
    RunSpec::new(["sh", "-c", script])
}

#[tokio::test]
async fn captures_merged_output_in_order_of_arrival() {
    let runner = runner();
    let outcome = runner.run_spec(sh("echo one; echo two")).await;

    assert_eq!(outcome.status, ProcessStatus::Exited { code: 0 });
    assert!(outcome.success);
    assert_eq!(outcome.output.lines, ["one", "two"]);
}

#[tokio::test]
async fn stderr_is_merged_with_stdout() {
    let runner = runner();
    let outcome = runner.run_spec(sh("echo err >&2")).await;
    assert_eq!(outcome.output.lines, ["err"]);
}

#[tokio::test]
async fn nonzero_exit_is_not_success() {
    let runner = runner();
    let outcome = runner.run_spec(sh("exit 3")).await;
    assert_eq!(outcome.status, ProcessStatus::Exited { code: 3 });
    assert!(!outcome.success);
}

#[tokio::test]
async fn success_predicate_overrides_exit_code() {
    let runner = runner();
    let mut spec = sh("echo 'r10 = abc'; exit 1");
    spec.success = Some(|_code, output| output.any_line_contains("r10 = "));
    let outcome = runner.run_spec(spec).await;
    assert!(outcome.success);

    let mut spec = sh("exit 0");
    spec.success = Some(|_code, output| !output.is_empty());
    let outcome = runner.run_spec(spec).await;
    // Exit 0 but the predicate demands output; tool exit codes are not
    // trusted on their own.
    assert!(!outcome.success);
}

#[tokio::test]
async fn spawn_failure_is_an_outcome_not_a_panic() {
    let runner = runner();
    let outcome = runner
        .run_spec(RunSpec::new(["definitely-not-a-real-binary-7f3a"]))
        .await;
    assert_eq!(outcome.status, ProcessStatus::SpawnError);
    assert!(!outcome.success);
    assert_eq!(runner.table().finished_snapshot().len(), 1);
}

#[tokio::test]
async fn empty_argv_is_a_spawn_error() {
    let runner = runner();
    let outcome = runner.run_spec(RunSpec::new(Vec::<String>::new())).await;
    assert_eq!(outcome.status, ProcessStatus::SpawnError);
}

#[tokio::test]
async fn inactivity_timeout_kills_silent_child() {
    let runner = runner();
    let spec = sh("echo start; sleep 30").inactivity_timeout(Duration::from_millis(300));
    let start = std::time::Instant::now();
    let outcome = runner.run_spec(spec).await;

    assert_eq!(outcome.status, ProcessStatus::Stalled);
    assert!(!outcome.success);
    assert_eq!(outcome.output.lines, ["start"]);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn wall_timeout_kills_chatty_child_too() {
    let runner = runner();
    // Steady output, so only the wall clock can catch it.
    let spec = sh("while true; do echo tick; sleep 1; done")
        .wall_timeout(Duration::from_millis(400));
    let outcome = runner.run_spec(spec).await;

    assert_eq!(outcome.status, ProcessStatus::TimedOut);
    assert!(!outcome.success);
    assert!(outcome.output.total > 0);
}

#[tokio::test]
async fn killed_child_leaves_no_live_record() {
    let runner = runner();
    let spec = sh("sleep 30").inactivity_timeout(Duration::from_millis(200));
    let _ = runner.run_spec(spec).await;

    assert_eq!(runner.table().live_count(), 0);
    let finished = runner.table().finished_snapshot();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, ProcessStatus::Stalled);
}

#[tokio::test]
async fn output_is_truncated_to_caps_keeping_tail() {
    let runner = runner_with(RunnerConfig {
        caps: OutputCaps {
            max_lines: 5,
            max_line_len: 200,
        },
        kill_grace: Duration::from_millis(500),
        poll_interval: Duration::from_millis(50),
    });
    let outcome = runner
        .run_spec(sh("for i in $(seq 1 20); do echo line-$i; done"))
        .await;

    assert_eq!(outcome.output.total, 20);
    assert_eq!(outcome.output.dropped, 15);
    assert_eq!(
        outcome.output.lines,
        ["line-16", "line-17", "line-18", "line-19", "line-20"]
    );
}

#[tokio::test]
async fn argv_is_redacted_in_the_record() {
    let table = ProcessTable::new();
    let redactor = RedactionSink::new();
    redactor.register("hunter2");
    let runner = ProcessRunner::new(
        table.clone(),
        redactor,
        Arc::new(SystemClock),
        RunnerConfig::default(),
    );

    let _ = runner
        .run_spec(RunSpec::new(["sh", "-c", "true", "--password=hunter2"]))
        .await;

    let finished = table.finished_snapshot();
    let argv = finished[0].argv.join(" ");
    assert!(!argv.contains("hunter2"), "argv leaked a secret: {argv}");
    assert!(argv.contains("<REDACTED>"));
}

#[tokio::test]
async fn extra_env_reaches_the_child() {
    let runner = runner();
    let outcome = runner
        .run_spec(sh("echo value=$RC_TEST_VAR").env("RC_TEST_VAR", "42"))
        .await;
    assert_eq!(outcome.output.lines, ["value=42"]);
}

#[tokio::test]
async fn cwd_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let runner = runner();
    let outcome = runner.run_spec(sh("pwd").cwd(dir.path())).await;
    let printed = &outcome.output.lines[0];
    // Allow for symlinked temp dirs (macOS /private prefix).
    assert!(printed.ends_with(
        dir.path()
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
    ));
}

#[tokio::test]
async fn partial_final_line_is_kept() {
    let runner = runner();
    let outcome = runner.run_spec(sh("printf 'no newline'")).await;
    assert_eq!(outcome.output.lines, ["no newline"]);
}
