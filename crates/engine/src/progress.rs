// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress verification from `git svn`'s on-disk state.
//!
//! The wrapped tool's exit code is not trusted; the revision-map files
//! and the `.metadata` file it maintains are. Both are read-only to us:
//! we parse them to decide whether a fetch actually advanced and whether
//! branches/tags have been scanned far enough to skip work.

use rc_core::ProcessStatus;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What the local clone knows about converted history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionState {
    /// Highest SVN revision with a Git commit, from the rev-map tails.
    pub last_converted_rev: Option<u64>,
    /// `branches-maxRev` from the tool's metadata file.
    pub branches_max_rev: Option<u64>,
    /// `tags-maxRev` from the tool's metadata file.
    pub tags_max_rev: Option<u64>,
}

impl ConversionState {
    /// Read the conversion state under `git_dir`. Missing files mean a
    /// fresh or partial clone and yield `None` fields; anything else
    /// unreadable is a real local error.
    pub fn read(git_dir: &Path) -> Result<Self, ProgressError> {
        let svn_dir = git_dir.join("svn");
        let (branches_max_rev, tags_max_rev) = read_metadata(&svn_dir.join(".metadata"))?;
        Ok(Self {
            last_converted_rev: max_rev_map_revision(&svn_dir)?,
            branches_max_rev,
            tags_max_rev,
        })
    }

    /// Whether metadata says branches and tags were scanned at least to
    /// `rev`. Vacuously true when the layout tracks no branches/tags
    /// (no metadata entries ever appear then).
    pub fn scanned_through(&self, rev: u64) -> bool {
        self.branches_max_rev.map_or(true, |r| r >= rev)
            && self.tags_max_rev.map_or(true, |r| r >= rev)
    }
}

/// Highest revision across every rev-map file under `svn_dir`.
fn max_rev_map_revision(svn_dir: &Path) -> Result<Option<u64>, ProgressError> {
    let mut best: Option<u64> = None;
    for path in find_rev_maps(svn_dir)? {
        let bytes = std::fs::read(&path).map_err(|source| ProgressError::Io {
            path: path.clone(),
            source,
        })?;
        if let Some(rev) = rev_map_tail(&bytes) {
            best = Some(best.map_or(rev, |b| b.max(rev)));
        }
    }
    Ok(best)
}

/// Recursively locate `.rev_map.*` files. A missing `svn/` directory is
/// simply an unconverted repo.
fn find_rev_maps(dir: &Path) -> Result<Vec<PathBuf>, ProgressError> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(source) => {
                return Err(ProgressError::Io {
                    path: current,
                    source,
                })
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(".rev_map."))
            {
                found.push(path);
            }
        }
    }
    Ok(found)
}

/// Fixed-width rev-map records: 4-byte big-endian SVN revision followed
/// by the raw commit OID (20 bytes for sha1, 32 for sha256). The tail
/// may hold all-zero padding records; the last real record wins.
pub fn rev_map_tail(bytes: &[u8]) -> Option<u64> {
    let record_len = if bytes.len() % 24 == 0 {
        24
    } else if bytes.len() % 36 == 0 {
        36
    } else {
        return None;
    };

    bytes
        .chunks_exact(record_len)
        .rev()
        .find(|record| record.iter().any(|b| *b != 0))
        .map(|record| u32::from_be_bytes([record[0], record[1], record[2], record[3]]) as u64)
}

/// Parse `branches-maxRev` and `tags-maxRev` out of the git-config-style
/// `.metadata` file.
fn read_metadata(path: &Path) -> Result<(Option<u64>, Option<u64>), ProgressError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((None, None)),
        Err(source) => {
            return Err(ProgressError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut branches = None;
    let mut tags = None;
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "branches-maxRev" => branches = value.trim().parse().ok(),
            "tags-maxRev" => tags = value.trim().parse().ok(),
            _ => {}
        }
    }
    Ok((branches, tags))
}

/// Statuses of a fetch child that mean "the runner killed it", which
/// the worker maps onto the stall-retry path.
pub fn killed_by_runner(status: ProcessStatus) -> bool {
    matches!(status, ProcessStatus::Stalled | ProcessStatus::TimedOut)
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
