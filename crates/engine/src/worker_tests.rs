// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use rc_adapters::{FakeResponse, FakeRunner};
use rc_core::{ChildProcessRecord, FakeClock, SystemClock};

const OID: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn repo() -> RepoDescriptor {
    RepoDescriptor::new(
        "svn.example.com",
        "acme",
        "widget",
        "corp",
        "https://svn.example.com/repos/widget",
    )
}

fn worker(runner: Arc<FakeRunner>, serve_root: &Path) -> ConversionWorker {
    let mut config = WorkerConfig::new(serve_root);
    config.backoff_base = Duration::from_millis(1);
    config.backoff_cap = Duration::from_millis(5);
    ConversionWorker::new(runner, ProcessTable::new(), Arc::new(SystemClock), config)
}

fn shutdown_handle() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

fn probe_ok(revision: u64, last_changed: u64) -> FakeResponse {
    FakeResponse::ok([
        "URL: https://svn.example.com/repos/widget".to_string(),
        "Repository Root: https://svn.example.com/repos".to_string(),
        "Repository UUID: 5a16f9a3-1c9e-4d8a-9d5e-0242ac120002".to_string(),
        format!("Revision: {revision}"),
        format!("Last Changed Rev: {last_changed}"),
    ])
}

/// Mimic `git svn` state: a sha1 rev-map whose last record is `rev`.
fn write_rev_map(git_dir: &Path, rev: u32) {
    let dir = git_dir.join("svn/refs/remotes/git-svn/trunk");
    std::fs::create_dir_all(&dir).unwrap();
    let mut bytes = Vec::new();
    for r in 1..=rev {
        bytes.extend(r.to_be_bytes());
        bytes.extend([0xab; 20]);
    }
    std::fs::write(dir.join(".rev_map.5a16f9a3"), bytes).unwrap();
}

fn write_metadata(git_dir: &Path, branches: u64, tags: u64) {
    let svn = git_dir.join("svn");
    std::fs::create_dir_all(&svn).unwrap();
    std::fs::write(
        svn.join(".metadata"),
        format!(
            "[svn-remote \"svn\"]\n\tbranches-maxRev = {branches}\n\ttags-maxRev = {tags}\n"
        ),
    )
    .unwrap();
}

fn committed_lines(from: u32, to: u32) -> Vec<String> {
    (from..=to)
        .map(|r| format!("r{r} = {OID} (refs/remotes/git-svn/trunk)"))
        .collect()
}

#[tokio::test]
async fn first_time_creation_converts_and_promotes() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(10, 10));
    runner.push(FakeResponse::ok(["Initialized empty Git repository"])); // git svn init
    runner.push(FakeResponse::ok(Vec::<String>::new())); // core.bare
    runner.push(FakeResponse::ok(Vec::<String>::new())); // layout recording
    runner.push(FakeResponse::ok([
        "------------------------------------------------------------------------".to_string(),
        "r1 | alice | 2009-01-14 | 1 line".to_string(),
    ])); // first-rev probe
    let effect_dir = git_dir.clone();
    runner.push(
        FakeResponse::ok(committed_lines(1, 10)).with_effect(move |_| {
            write_rev_map(&effect_dir, 10);
            write_metadata(&effect_dir, 10, 10);
        }),
    ); // fetch
    runner.push(FakeResponse::ok([format!(
        "{OID} refs/remotes/git-svn/trunk"
    )])); // for-each-ref
    runner.push(FakeResponse::ok(Vec::<String>::new())); // update-ref
    runner.push(FakeResponse::ok(Vec::<String>::new())); // symbolic-ref HEAD
    runner.push(FakeResponse::ok(Vec::<String>::new())); // gc (bootstrap)

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::Done));
    assert_eq!(job.rev_before, None);
    assert_eq!(job.rev_after, Some(10));
    assert_eq!(job.retries, 0);

    assert_eq!(runner.calls_starting_with(&["svn", "info"]).len(), 1);
    assert_eq!(runner.calls_starting_with(&["git", "svn", "init"]).len(), 1);
    let fetches = runner.calls_starting_with(&["git", "svn", "fetch"]);
    assert_eq!(fetches.len(), 1);
    assert!(fetches[0].contains(&"--log-window-size=100".to_string()));
    // Fresh clone seeds the lower bound from the first real revision.
    assert!(fetches[0].contains(&"--revision=1:HEAD".to_string()));
    assert_eq!(runner.calls_starting_with(&["git", "gc"]).len(), 1);
}

#[tokio::test]
async fn up_to_date_repo_is_one_probe_and_no_fetch() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 10, 10);

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(12, 10)); // repo-wide rev is ahead, subtree is not
    runner.push(FakeResponse::ok(["standard"])); // recorded layout

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::NoWork));
    assert_eq!(runner.calls_starting_with(&["svn", "info"]).len(), 1);
    assert!(runner.calls_starting_with(&["git", "svn"]).is_empty());
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn metadata_behind_tip_forces_a_fetch() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    // Branch scan is behind the tip: not up to date.
    write_metadata(&git_dir, 7, 7);

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(10, 10));
    runner.push(FakeResponse::ok(["standard"]));
    let effect_dir = git_dir.clone();
    runner.push(
        FakeResponse::ok(committed_lines(11, 11)).with_effect(move |_| {
            write_rev_map(&effect_dir, 11);
            write_metadata(&effect_dir, 11, 11);
        }),
    );
    runner.push(FakeResponse::ok([format!(
        "{OID} refs/remotes/git-svn/trunk"
    )]));
    runner.push(FakeResponse::ok(Vec::<String>::new())); // update-ref
    runner.push(FakeResponse::ok(Vec::<String>::new())); // HEAD

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::Done));
    assert_eq!(runner.calls_starting_with(&["git", "svn", "fetch"]).len(), 1);
    // Established clone: no gc outside bootstrap.
    assert!(runner.calls_starting_with(&["git", "gc"]).is_empty());
}

#[tokio::test]
async fn layout_change_ignores_scan_metadata() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 10, 10);

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(10, 10));
    // Recorded layout differs from the manifest's `standard`.
    runner.push(FakeResponse::ok(["trunk=main;branches=;tags="]));
    let effect_dir = git_dir.clone();
    runner.push(
        FakeResponse::ok(committed_lines(11, 11)).with_effect(move |_| {
            write_rev_map(&effect_dir, 11);
        }),
    );
    runner.push(FakeResponse::ok([format!(
        "{OID} refs/remotes/git-svn/trunk"
    )]));
    runner.push(FakeResponse::ok(Vec::<String>::new()));
    runner.push(FakeResponse::ok(Vec::<String>::new()));

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    // Would have been no_work if the metadata were trusted.
    assert_eq!(job.outcome(), Some(JobOutcome::Done));
    assert_eq!(runner.calls_starting_with(&["git", "svn", "fetch"]).len(), 1);
}

#[tokio::test]
async fn stalled_fetches_halve_the_window_until_permanent_failure() {
    let serve_root = tempfile::tempdir().unwrap();
    let mut repo = repo();
    repo.max_retries = 2;
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 5, 5);

    let runner = Arc::new(FakeRunner::new());
    for _ in 0..3 {
        runner.push(probe_ok(20, 20));
        runner.push(FakeResponse::ok(["standard"]));
        runner.push(FakeResponse::stalled(["r?"]));
    }

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::PermanentFailure));
    assert_eq!(job.retries, 3);
    // 100 → 50 → 25; the halving that would follow the third failure is
    // moot because retries are exhausted.
    assert_eq!(job.log_window, 25);

    let fetches = runner.calls_starting_with(&["git", "svn", "fetch"]);
    assert_eq!(fetches.len(), 3);
    assert!(fetches[0].contains(&"--log-window-size=100".to_string()));
    assert!(fetches[1].contains(&"--log-window-size=50".to_string()));
    assert!(fetches[2].contains(&"--log-window-size=25".to_string()));
    // The probe is re-run before every attempt.
    assert_eq!(runner.calls_starting_with(&["svn", "info"]).len(), 3);
}

#[tokio::test]
async fn silent_failure_retries_without_halving() {
    let serve_root = tempfile::tempdir().unwrap();
    let mut repo = repo();
    repo.max_retries = 1;
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 5, 5);

    let runner = Arc::new(FakeRunner::new());
    for _ in 0..2 {
        runner.push(probe_ok(20, 20));
        runner.push(FakeResponse::ok(["standard"]));
        runner.push(FakeResponse::ok(Vec::<String>::new())); // exit 0, no output, no progress
    }

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::PermanentFailure));
    assert_eq!(job.log_window, 100, "silent failures must not shrink the window");
    assert!(job.last_error.as_deref().unwrap_or("").contains("silent"));
}

#[tokio::test]
async fn transient_token_halves_but_auth_does_not() {
    let serve_root = tempfile::tempdir().unwrap();
    let mut repo = repo();
    repo.max_retries = 2;
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 5, 5);

    let runner = Arc::new(FakeRunner::new());
    // Attempt 1: transient network error → halve.
    runner.push(probe_ok(20, 20));
    runner.push(FakeResponse::ok(["standard"]));
    runner.push(FakeResponse::exit(1, ["svn: E175012: Connection timed out"]));
    // Attempt 2: auth failure → keep window.
    runner.push(probe_ok(20, 20));
    runner.push(FakeResponse::ok(["standard"]));
    runner.push(FakeResponse::exit(1, ["svn: E215004: Authorization failed"]));
    // Attempt 3: auth again → exhausted.
    runner.push(probe_ok(20, 20));
    runner.push(FakeResponse::ok(["standard"]));
    runner.push(FakeResponse::exit(1, ["svn: E215004: Authorization failed"]));

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::PermanentFailure));
    let fetches = runner.calls_starting_with(&["git", "svn", "fetch"]);
    assert!(fetches[1].contains(&"--log-window-size=50".to_string()));
    assert!(fetches[2].contains(&"--log-window-size=50".to_string()));
    assert!(job.last_error.as_deref().unwrap_or("").contains("authentication"));
}

#[tokio::test]
async fn tip_regression_is_corruption_with_no_retry() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 5, 5);

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(20, 20));
    runner.push(FakeResponse::ok(["standard"]));
    let effect_dir = git_dir.clone();
    runner.push(
        FakeResponse::ok(committed_lines(1, 5)).with_effect(move |_| {
            // The rev-map shrank: tip moved backwards.
            let dir = effect_dir.join("svn/refs/remotes/git-svn/trunk");
            let mut bytes = Vec::new();
            for r in 1u32..=5 {
                bytes.extend(r.to_be_bytes());
                bytes.extend([0xab; 20]);
            }
            std::fs::write(dir.join(".rev_map.5a16f9a3"), bytes).unwrap();
        }),
    );

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::Corruption));
    assert_eq!(job.retries, 0, "corruption is never retried");
    assert_eq!(runner.calls_starting_with(&["git", "svn", "fetch"]).len(), 1);
}

#[tokio::test]
async fn maintenance_warnings_demote_the_outcome() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let git_dir = repo.clone_dir(serve_root.path());
    write_rev_map(&git_dir, 10);
    write_metadata(&git_dir, 5, 5);

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(11, 11));
    runner.push(FakeResponse::ok(["standard"]));
    let effect_dir = git_dir.clone();
    runner.push(
        FakeResponse::ok(committed_lines(11, 11)).with_effect(move |_| {
            write_rev_map(&effect_dir, 11);
        }),
    );
    runner.push(FakeResponse::ok([format!(
        "{OID} refs/remotes/git-svn/trunk"
    )]));
    runner.push(FakeResponse::exit(128, ["fatal: ref locked"])); // update-ref fails

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::DoneWithWarnings));
}

#[tokio::test]
async fn probe_failures_retry_then_exhaust() {
    let serve_root = tempfile::tempdir().unwrap();
    let mut repo = repo();
    repo.max_retries = 1;

    let runner = Arc::new(FakeRunner::new());
    runner.push(FakeResponse::exit(1, ["svn: E170013: Unable to connect"]));
    runner.push(FakeResponse::exit(1, ["svn: E170013: Unable to connect"]));

    let worker = worker(runner.clone(), serve_root.path());
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::PermanentFailure));
    assert_eq!(runner.calls().len(), 2);
    assert!(job.last_error.as_deref().unwrap_or("").contains("probe"));
}

#[tokio::test]
async fn another_live_worker_yields_already_running() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();

    let table = ProcessTable::new();
    let clock = FakeClock::new();
    table.register(ChildProcessRecord::new(
        999,
        999,
        vec!["git".into(), "svn".into(), "fetch".into()],
        Some(repo.repo_key.clone()),
        &clock,
    ));

    let runner = Arc::new(FakeRunner::new());
    runner.push(probe_ok(10, 10));

    let mut config = WorkerConfig::new(serve_root.path());
    config.backoff_base = Duration::from_millis(1);
    let worker = ConversionWorker::new(runner.clone(), table, Arc::new(SystemClock), config);
    let (_tx, rx) = shutdown_handle();
    let job = worker.convert(&repo, rx).await;

    assert_eq!(job.outcome(), Some(JobOutcome::AlreadyRunning));
    assert!(runner.calls_starting_with(&["git", "svn"]).is_empty());
}

#[tokio::test]
async fn shutdown_before_start_is_interrupted() {
    let serve_root = tempfile::tempdir().unwrap();
    let repo = repo();
    let runner = Arc::new(FakeRunner::new());

    let worker = worker(runner.clone(), serve_root.path());
    let (tx, rx) = shutdown_handle();
    tx.send(true).unwrap();

    let job = worker.convert(&repo, rx).await;
    assert_eq!(job.outcome(), Some(JobOutcome::Interrupted));
    assert!(runner.calls().is_empty());
}
