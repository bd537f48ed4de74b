//! Bounded-cycle run specs: scheduling, logging shape, redaction.

use crate::prelude::*;

#[test]
fn empty_manifest_completes_one_cycle_and_exits_zero() {
    Supervisor::new("")
        .run()
        .passes()
        .stdout_has("cycle complete")
        .stdout_has("shutdown complete")
        .stdout_is_json_lines();
}

#[test]
fn cycle_budget_bounds_the_run() {
    // Three fast cycles, then a clean exit.
    Supervisor::new("")
        .env("MAX_CYCLES", "3")
        .env("REPO_CONVERTER_INTERVAL_SECONDS", "1")
        .run()
        .passes()
        .stdout_has("cycle budget reached");
}

#[test]
fn unknown_manifest_keys_warn_but_do_not_abort() {
    let manifest = r#"
corp:
  code-host-name: svn.example.com
  definitely-a-typo: yes
  repos: {}
"#;
    Supervisor::new(manifest)
        .run()
        .passes()
        .stdout_has("unknown server key");
}

#[test]
fn reserved_repo_types_are_skipped_with_a_debug_line() {
    let manifest = r#"
corp:
  code-host-name: svn.example.com
  repos:
    someday:
      type: tfvc
      url: https://tfs.example.com/collection/someday
"#;
    Supervisor::new(manifest)
        .run()
        .passes()
        .stdout_has("skip: unsupported type");
}

#[test]
fn credentials_never_reach_the_logs() {
    // The repo is unconvertible (no svn server behind the URL), so the
    // job fails and logs argv and error details; none of it may contain
    // the password.
    let manifest = r#"
corp:
  code-host-name: svn.invalid
  username: converter
  password: sup3r-s3cret-hunter2
  repos:
    widget:
      type: svn
      url: https://svn.invalid/repos/widget
"#;
    Supervisor::new(manifest)
        .env("MAX_CYCLES", "2")
        .env("REPO_CONVERTER_INTERVAL_SECONDS", "2")
        .run()
        .passes()
        .stdout_lacks("sup3r-s3cret-hunter2")
        .stdout_has("<REDACTED>");
}

#[test]
fn unconvertible_repo_fails_its_job_but_not_the_supervisor() {
    let manifest = r#"
corp:
  code-host-name: svn.invalid
  repos:
    widget:
      type: svn
      url: https://svn.invalid/repos/widget
"#;
    // Two cycles so the first job's terminal state lands in the logs
    // before the run winds down.
    Supervisor::new(manifest)
        .env("MAX_CYCLES", "2")
        .env("REPO_CONVERTER_INTERVAL_SECONDS", "2")
        .run()
        .passes()
        .stdout_has("job failed");
}
