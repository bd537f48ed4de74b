// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::FakeClock;
use crate::repo::RepoKey;

fn record(clock: &FakeClock) -> ChildProcessRecord {
    ChildProcessRecord::new(
        4321,
        4321,
        vec!["git".into(), "svn".into(), "fetch".into()],
        Some(RepoKey::derive("host", "org", "repo")),
        clock,
    )
}

#[test]
fn new_record_is_running() {
    let clock = FakeClock::new();
    let rec = record(&clock);
    assert!(rec.status.is_running());
    assert_eq!(rec.pid, 4321);
    assert_eq!(rec.ppid, std::process::id());
    assert!(rec.error.is_none());
}

#[test]
fn spawn_failed_record_carries_os_error() {
    let clock = FakeClock::new();
    let rec = ChildProcessRecord::spawn_failed(
        vec!["nosuch".into()],
        None,
        "No such file or directory",
        &clock,
    );
    assert_eq!(rec.status, ProcessStatus::SpawnError);
    assert_eq!(rec.pid, 0);
    assert_eq!(rec.error.as_deref(), Some("No such file or directory"));
}

#[test]
fn push_output_line_refreshes_activity_and_caps_tail() {
    let clock = FakeClock::new();
    let mut rec = record(&clock);
    let before = rec.last_activity_ms;

    clock.advance(Duration::from_secs(3));
    for i in 0..(OUTPUT_TAIL_CAP + 10) {
        rec.push_output_line(format!("r{i} = abc"), &clock);
    }

    assert!(rec.last_activity_ms > before);
    assert_eq!(rec.output_tail.len(), OUTPUT_TAIL_CAP);
    // Oldest lines rolled off; newest kept.
    assert_eq!(
        rec.output_tail.last().map(String::as_str),
        Some(format!("r{} = abc", OUTPUT_TAIL_CAP + 9).as_str())
    );
}

#[test]
fn runtime_follows_clock() {
    let clock = FakeClock::new();
    let rec = record(&clock);
    clock.advance(Duration::from_secs(120));
    assert_eq!(rec.runtime(&clock), Duration::from_secs(120));
}

#[test]
fn status_display_labels() {
    assert_eq!(ProcessStatus::Running.to_string(), "running");
    assert_eq!(ProcessStatus::Exited { code: 0 }.to_string(), "exited:0");
    assert_eq!(
        ProcessStatus::Signalled { signal: 9 }.to_string(),
        "signalled:9"
    );
    assert_eq!(ProcessStatus::Stalled.to_string(), "stalled");
}

#[test]
fn resource_sample_defaults_to_unknown() {
    let sample = ResourceSample::default();
    assert!(sample.state.is_none());
    assert!(sample.rss_bytes.is_none());
    assert!(sample.sockets.is_none());
}
