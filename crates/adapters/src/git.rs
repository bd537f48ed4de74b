// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `git` / `git svn` command-line adapter.
//!
//! Pure argv builders plus small plumbing-output parsers. Everything
//! here is testable without a git binary; execution goes through the
//! process runner.

use rc_core::{RepoDescriptor, SvnLayout};

/// Ref namespace `git svn` fetches into. The trailing slash matters:
/// without it `git svn` treats the prefix as a ref name stem.
pub const REMOTE_PREFIX: &str = "git-svn/";

/// Argv for `git svn init` of a fresh conversion, run inside the (empty)
/// clone directory.
pub fn svn_init_argv(repo: &RepoDescriptor) -> Vec<String> {
    let mut argv = vec![
        "git".to_string(),
        "svn".to_string(),
        "init".to_string(),
        format!("--prefix={REMOTE_PREFIX}"),
    ];

    match &repo.layout {
        SvnLayout::Standard if repo.default_branch_only => {
            argv.push("--trunk=trunk".to_string());
        }
        SvnLayout::Standard => argv.push("--stdlayout".to_string()),
        SvnLayout::Explicit {
            trunk,
            branches,
            tags,
        } => {
            if let Some(trunk) = trunk {
                argv.push(format!("--trunk={trunk}"));
            }
            if !repo.default_branch_only {
                for branch in branches {
                    argv.push(format!("--branches={branch}"));
                }
                for tag in tags {
                    argv.push(format!("--tags={tag}"));
                }
            }
        }
    }

    argv.push(repo.url.clone());
    argv
}

/// Argv for one `git svn fetch` attempt.
///
/// `log_window` is the number of revisions per server round-trip;
/// `revision_floor` forces `--revision BASE:HEAD` to skip the
/// revision-0 empty-request storm on a fresh clone.
pub fn svn_fetch_argv(
    repo: &RepoDescriptor,
    log_window: u32,
    revision_floor: Option<u64>,
) -> Vec<String> {
    let mut argv = vec![
        "git".to_string(),
        "svn".to_string(),
        "fetch".to_string(),
        format!("--log-window-size={log_window}"),
    ];
    if let Some(floor) = revision_floor {
        argv.push(format!("--revision={floor}:HEAD"));
    }
    if let Some(authors_file) = &repo.authors_file {
        argv.push(format!("--authors-file={}", authors_file.display()));
    }
    if let Some(authors_prog) = &repo.authors_prog {
        argv.push(format!("--authors-prog={}", authors_prog.display()));
    }
    argv
}

pub fn config_set_argv(key: &str, value: &str) -> Vec<String> {
    vec![
        "git".to_string(),
        "config".to_string(),
        key.to_string(),
        value.to_string(),
    ]
}

pub fn config_get_argv(key: &str) -> Vec<String> {
    vec!["git".to_string(), "config".to_string(), "--get".to_string(), key.to_string()]
}

/// Argv listing refs under `pattern` as `<oid> <refname>` lines.
pub fn for_each_ref_argv(pattern: &str) -> Vec<String> {
    vec![
        "git".to_string(),
        "for-each-ref".to_string(),
        "--format=%(objectname) %(refname)".to_string(),
        pattern.to_string(),
    ]
}

/// Parse `for-each-ref` output into `(oid, refname)` pairs. Lines that
/// do not match the expected two-column shape are skipped.
pub fn parse_refs(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .filter_map(|line| {
            let (oid, name) = line.trim().split_once(' ')?;
            if oid.len() >= 40 && oid.chars().all(|c| c.is_ascii_hexdigit()) {
                Some((oid.to_string(), name.to_string()))
            } else {
                None
            }
        })
        .collect()
}

pub fn update_ref_argv(refname: &str, oid: &str) -> Vec<String> {
    vec![
        "git".to_string(),
        "update-ref".to_string(),
        refname.to_string(),
        oid.to_string(),
    ]
}

pub fn symbolic_ref_argv(name: &str, target: &str) -> Vec<String> {
    vec![
        "git".to_string(),
        "symbolic-ref".to_string(),
        name.to_string(),
        target.to_string(),
    ]
}

pub fn gc_argv() -> Vec<String> {
    vec!["git".to_string(), "gc".to_string(), "--quiet".to_string()]
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
