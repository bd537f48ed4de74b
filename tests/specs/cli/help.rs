//! CLI surface specs: rcd takes no subcommands, only info flags.

use crate::prelude::*;

fn bare_rcd(args: &[&str]) -> std::process::Output {
    std::process::Command::new(rcd_binary())
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn version_flag_prints_version_and_exits_zero() {
    let out = bare_rcd(&["--version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.starts_with("rcd 0.1"), "unexpected: {stdout}");
}

#[test]
fn help_flag_documents_env_driven_control() {
    let out = bare_rcd(&["--help"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("USAGE:"));
    assert!(stdout.contains("REPOS_TO_CONVERT"));
    assert!(stdout.contains("--version"));
}

#[test]
fn unexpected_argument_is_rejected() {
    let out = bare_rcd(&["convert-now"]);
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unexpected argument"));
}
