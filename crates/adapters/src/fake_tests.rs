// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn responses_are_consumed_in_order() {
    let runner = FakeRunner::new();
    runner.push(FakeResponse::ok(["first"]));
    runner.push(FakeResponse::exit(1, ["second"]));

    let a = runner.run(RunSpec::new(["svn", "info"])).await;
    let b = runner.run(RunSpec::new(["git", "svn", "fetch"])).await;

    assert!(a.success);
    assert_eq!(a.output.lines, ["first"]);
    assert!(!b.success);
    assert_eq!(b.status, ProcessStatus::Exited { code: 1 });
    assert_eq!(runner.remaining(), 0);
}

#[tokio::test]
async fn exhausted_script_defaults_to_silent_success() {
    let runner = FakeRunner::new();
    let outcome = runner.run(RunSpec::new(["git", "gc"])).await;
    assert!(outcome.success);
    assert!(outcome.output.is_empty());
}

#[tokio::test]
async fn calls_are_recorded_and_filterable() {
    let runner = FakeRunner::new();
    runner.push(FakeResponse::ok(Vec::<String>::new()));
    runner.push(FakeResponse::ok(Vec::<String>::new()));

    let _ = runner.run(RunSpec::new(["svn", "info", "url"])).await;
    let _ = runner.run(RunSpec::new(["git", "svn", "fetch"])).await;

    assert_eq!(runner.calls().len(), 2);
    assert_eq!(runner.calls_starting_with(&["svn", "info"]).len(), 1);
    assert_eq!(runner.calls_starting_with(&["git"]).len(), 1);
    assert!(runner.calls_starting_with(&["rsync"]).is_empty());
}

#[tokio::test]
async fn stalled_response_is_never_successful() {
    let runner = FakeRunner::new();
    runner.push(FakeResponse::stalled(["r1 = abc"]));
    let outcome = runner.run(RunSpec::new(["git", "svn", "fetch"])).await;
    assert!(!outcome.success);
    assert_eq!(outcome.status, ProcessStatus::Stalled);
}

#[tokio::test]
async fn success_predicate_is_honoured() {
    let runner = FakeRunner::new();
    runner.push(FakeResponse::ok(Vec::<String>::new()));
    let mut spec = RunSpec::new(["git", "svn", "fetch"]);
    spec.success = Some(|_code, output| !output.is_empty());
    let outcome = runner.run(spec).await;
    assert!(!outcome.success, "exit 0 with empty output must not pass the predicate");
}
