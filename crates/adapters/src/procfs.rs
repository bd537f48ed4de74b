// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource sampling from `/proc` for the status monitor.
//!
//! Every accessor is best-effort: pids disappear between samples,
//! containers mount restricted procfs, and stat files occasionally fail
//! to parse. A partial sample is always preferable to an error, so each
//! field degrades to `None` independently.

use rc_core::{Clock, ResourceSample};
use std::path::PathBuf;

/// Assumed page size for RSS conversion. Reading the real value needs a
/// syscall; 4 KiB is correct on every platform this runs on.
const PAGE_SIZE: u64 = 4096;

/// Take one sample of `pid`. Fields the kernel would not give us are
/// `None`; the sample itself is always produced.
pub fn sample(pid: u32, clock: &(impl Clock + ?Sized)) -> ResourceSample {
    let mut out = ResourceSample {
        sampled_at_ms: clock.epoch_ms(),
        ..ResourceSample::default()
    };

    if let Some((state, utime, stime)) = read_stat(pid) {
        out.state = Some(state);
        out.utime_ticks = Some(utime);
        out.stime_ticks = Some(stime);
    }
    out.rss_bytes = read_rss(pid);
    if let Some((fds, sockets)) = count_fds(pid) {
        out.open_fds = Some(fds);
        out.sockets = Some(sockets);
    }
    out
}

fn proc_path(pid: u32, leaf: &str) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}/{leaf}"))
}

/// Parse `/proc/<pid>/stat`: state letter plus user/system CPU ticks.
///
/// The comm field is parenthesised and may itself contain spaces and
/// parens, so parsing starts after the last `)`.
fn read_stat(pid: u32) -> Option<(char, u64, u64)> {
    let stat = std::fs::read_to_string(proc_path(pid, "stat")).ok()?;
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After comm: state, ppid, pgrp, session, tty_nr, tpgid, flags,
    // minflt, cminflt, majflt, cmajflt, utime, stime, ...
    let state = fields.first()?.chars().next()?;
    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;
    Some((state, utime, stime))
}

/// Resident set size from `/proc/<pid>/statm` (second field, in pages).
fn read_rss(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(proc_path(pid, "statm")).ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

/// Count open descriptors and how many of them are sockets, which is
/// the closest procfs proxy for open network connections.
fn count_fds(pid: u32) -> Option<(u32, u32)> {
    let entries = std::fs::read_dir(proc_path(pid, "fd")).ok()?;
    let mut fds = 0u32;
    let mut sockets = 0u32;
    for entry in entries.flatten() {
        fds += 1;
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if target.to_string_lossy().starts_with("socket:") {
                sockets += 1;
            }
        }
    }
    Some((fds, sockets))
}

#[cfg(test)]
#[path = "procfs_tests.rs"]
mod tests;
