//! Graceful shutdown specs.

use crate::prelude::*;
use std::time::{Duration, Instant};

fn wait_for_exit(child: &mut std::process::Child, max: Duration) -> Option<i32> {
    let deadline = Instant::now() + max;
    while Instant::now() < deadline {
        if let Ok(Some(status)) = child.try_wait() {
            return status.code();
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    None
}

#[test]
fn sigterm_drains_and_exits_zero() {
    // Unbounded cycles: only the signal can end this run.
    let supervisor = Supervisor::new("").env("MAX_CYCLES", "0");
    let mut child = supervisor.command().spawn().unwrap();

    // Give the supervisor a moment to install handlers and start the
    // first cycle.
    std::thread::sleep(Duration::from_millis(800));

    let pid = child.id().to_string();
    let kill = std::process::Command::new("kill")
        .args(["-TERM", &pid])
        .status()
        .unwrap();
    assert!(kill.success());

    let code = wait_for_exit(&mut child, Duration::from_secs(20));
    assert_eq!(code, Some(0), "supervisor must exit 0 on SIGTERM");

    let mut stdout = String::new();
    use std::io::Read;
    child
        .stdout
        .take()
        .unwrap()
        .read_to_string(&mut stdout)
        .unwrap();
    assert!(stdout.contains("received SIGTERM"), "missing signal log:\n{stdout}");
    assert!(stdout.contains("shutdown complete"), "missing drain log:\n{stdout}");
}

#[test]
fn sigint_is_equivalent_to_sigterm() {
    let supervisor = Supervisor::new("").env("MAX_CYCLES", "0");
    let mut child = supervisor.command().spawn().unwrap();
    std::thread::sleep(Duration::from_millis(800));

    std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();

    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(20)), Some(0));
}

#[test]
fn second_signal_during_shutdown_is_harmless() {
    let supervisor = Supervisor::new("").env("MAX_CYCLES", "0");
    let mut child = supervisor.command().spawn().unwrap();
    std::thread::sleep(Duration::from_millis(800));

    let pid = child.id().to_string();
    for _ in 0..2 {
        std::process::Command::new("kill")
            .args(["-TERM", &pid])
            .status()
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }

    assert_eq!(wait_for_exit(&mut child, Duration::from_secs(20)), Some(0));
}
