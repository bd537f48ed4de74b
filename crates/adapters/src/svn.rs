// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `svn` command-line adapter: probe argv construction and `svn info`
//! output parsing.

use rc_core::RepoDescriptor;
use std::time::Duration;
use thiserror::Error;

/// Probes answer quickly or not at all; a hung probe blocks a whole
/// job slot, so it always carries a wall clock.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(120);

/// Parsed `svn info` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnInfo {
    pub url: String,
    pub repository_root: String,
    pub repository_uuid: String,
    /// Repo-wide tip revision.
    pub revision: u64,
    /// Tip of the subtree in scope; the authoritative "are we current"
    /// number even when the whole repo is higher.
    pub last_changed_rev: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SvnParseError {
    #[error("svn info output missing field '{0}'")]
    MissingField(&'static str),

    #[error("svn info field '{field}' is not a revision number: '{value}'")]
    BadRevision { field: &'static str, value: String },
}

/// Argv for `svn info` against the repo's configured URL.
///
/// `--non-interactive` keeps a credential prompt from hanging the probe
/// forever; credentials come from the descriptor when present.
pub fn info_argv(repo: &RepoDescriptor) -> Vec<String> {
    let mut argv = vec![
        "svn".to_string(),
        "info".to_string(),
        "--non-interactive".to_string(),
    ];
    if let Some(username) = &repo.username {
        argv.push("--username".to_string());
        argv.push(username.clone());
    }
    if let Some(password) = &repo.password {
        argv.push("--password".to_string());
        argv.push(password.clone());
    }
    argv.push(repo.url.clone());
    argv
}

/// Argv for finding the oldest revision of the subtree, used to seed
/// the fetch lower bound on a fresh clone. Without it `git svn` starts
/// at revision 0 and burns one empty server request per missing rev.
pub fn first_rev_argv(repo: &RepoDescriptor) -> Vec<String> {
    let mut argv = vec![
        "svn".to_string(),
        "log".to_string(),
        "--non-interactive".to_string(),
        "--limit".to_string(),
        "1".to_string(),
        "--revision".to_string(),
        "1:HEAD".to_string(),
    ];
    if let Some(username) = &repo.username {
        argv.push("--username".to_string());
        argv.push(username.clone());
    }
    if let Some(password) = &repo.password {
        argv.push("--password".to_string());
        argv.push(password.clone());
    }
    argv.push(repo.url.clone());
    argv
}

/// Pull the revision number out of `svn log` output: the header line
/// looks like `r3 | alice | 2009-01-01 ... | 2 lines`.
pub fn parse_first_rev(lines: &[String]) -> Option<u64> {
    lines.iter().find_map(|line| {
        let rest = line.strip_prefix('r')?;
        let (digits, tail) = rest.split_at(rest.find(|c: char| !c.is_ascii_digit())?);
        if tail.trim_start().starts_with('|') {
            digits.parse().ok()
        } else {
            None
        }
    })
}

/// Parse the colon-separated fields of `svn info` output.
pub fn parse_info(lines: &[String]) -> Result<SvnInfo, SvnParseError> {
    let field = |name: &'static str| -> Option<String> {
        lines.iter().find_map(|line| {
            line.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix(':'))
                .map(|value| value.trim().to_string())
        })
    };
    let revision_field = |name: &'static str| -> Result<u64, SvnParseError> {
        let value = field(name).ok_or(SvnParseError::MissingField(name))?;
        value.parse().map_err(|_| SvnParseError::BadRevision {
            field: name,
            value,
        })
    };

    Ok(SvnInfo {
        url: field("URL").ok_or(SvnParseError::MissingField("URL"))?,
        repository_root: field("Repository Root")
            .ok_or(SvnParseError::MissingField("Repository Root"))?,
        repository_uuid: field("Repository UUID")
            .ok_or(SvnParseError::MissingField("Repository UUID"))?,
        revision: revision_field("Revision")?,
        last_changed_rev: revision_field("Last Changed Rev")?,
    })
}

#[cfg(test)]
#[path = "svn_tests.rs"]
mod tests;
