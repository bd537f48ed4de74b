// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository descriptors: the fully-resolved description of one
//! repository to convert, produced by the manifest merge and consumed by
//! the scheduler and the conversion worker.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

crate::define_id! {
    /// Stable, filesystem- and URL-safe identifier for one logical
    /// repository, derived from (code host, org, repo name). The key is
    /// also the repo's path under the serve root, so deriving it
    /// deterministically keeps config edits from forking a repo into two
    /// on-disk directories.
    pub struct RepoKey;
}

crate::define_id! {
    /// Named group under which one or more repos are declared; also the
    /// identity used for per-server concurrency gating.
    pub struct ServerKey;
}

impl RepoKey {
    /// Derive the canonical key for (code host, org, repo name).
    ///
    /// Each segment is sanitized independently; the segments are joined
    /// with `/` and double as the relative on-disk path.
    pub fn derive(code_host: &str, org: &str, repo_name: &str) -> Self {
        Self(format!(
            "{}/{}/{}",
            sanitize_segment(code_host),
            sanitize_segment(org),
            sanitize_segment(repo_name)
        ))
    }

    /// The final path segment (the repo name part of the key).
    pub fn leaf(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

/// Lowercase a path/URL segment and replace anything outside
/// `[a-z0-9._-]` with `-`. Leading dots are replaced too, so a segment can
/// never be hidden or escape upward.
fn sanitize_segment(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '.' | '_' | '-') => c,
            _ => '-',
        })
        .collect();
    while out.starts_with('.') {
        out.replace_range(..1, "-");
    }
    if out.is_empty() {
        out.push('-');
    }
    out
}

/// Source version-control system of a declared repo.
///
/// Only Subversion conversion is implemented; the other variants are
/// accepted by the manifest and skipped with a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsType {
    Svn,
    Tfvc,
    Git,
}

impl std::fmt::Display for VcsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VcsType::Svn => write!(f, "svn"),
            VcsType::Tfvc => write!(f, "tfvc"),
            VcsType::Git => write!(f, "git"),
        }
    }
}

/// Mapping from SVN directory layout to Git refs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SvnLayout {
    /// Conventional `trunk` / `branches/*` / `tags/*`.
    Standard,
    /// Explicit paths. `branches` and `tags` are ordered; order is the
    /// collision precedence during ref promotion.
    Explicit {
        trunk: Option<String>,
        branches: Vec<String>,
        tags: Vec<String>,
    },
}

impl SvnLayout {
    pub fn is_standard(&self) -> bool {
        matches!(self, SvnLayout::Standard)
    }

    /// Trunk path in effect (`trunk` for the standard layout).
    pub fn trunk(&self) -> Option<&str> {
        match self {
            SvnLayout::Standard => Some("trunk"),
            SvnLayout::Explicit { trunk, .. } => trunk.as_deref(),
        }
    }

    /// Branch glob paths in effect, in declaration order.
    pub fn branches(&self) -> Vec<&str> {
        match self {
            SvnLayout::Standard => vec!["branches"],
            SvnLayout::Explicit { branches, .. } => branches.iter().map(String::as_str).collect(),
        }
    }

    /// Tag glob paths in effect, in declaration order.
    pub fn tags(&self) -> Vec<&str> {
        match self {
            SvnLayout::Standard => vec!["tags"],
            SvnLayout::Explicit { tags, .. } => tags.iter().map(String::as_str).collect(),
        }
    }

    /// Compact one-line form recorded in the bare repo's git config at
    /// init and compared on later runs to detect layout changes.
    pub fn fingerprint(&self) -> String {
        match self {
            SvnLayout::Standard => "standard".to_string(),
            SvnLayout::Explicit {
                trunk,
                branches,
                tags,
            } => format!(
                "trunk={};branches={};tags={}",
                trunk.as_deref().unwrap_or(""),
                branches.join(","),
                tags.join(",")
            ),
        }
    }
}

pub const DEFAULT_FETCH_BATCH_SIZE: u32 = 100;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_GIT_DEFAULT_BRANCH: &str = "trunk";

/// Fully-resolved description of one repository to convert.
///
/// Produced once per cycle by the manifest merge (repo > server > global >
/// built-in default); read-only everywhere else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub repo_key: RepoKey,
    pub server_key: ServerKey,
    pub vcs: VcsType,
    /// Remote URL of the subtree to convert.
    pub url: String,
    pub code_host_name: String,
    pub org_name: String,
    pub repo_name: String,
    /// Repository root, when the declared URL points below it.
    pub repo_root_url: Option<String>,
    pub username: Option<String>,
    /// Registered with the redaction sink the moment the manifest is read.
    pub password: Option<String>,
    pub layout: SvnLayout,
    pub git_default_branch: String,
    pub bare_clone: bool,
    pub default_branch_only: bool,
    /// Initial `--log-window-size` for `git svn fetch`.
    pub fetch_batch_size: u32,
    pub authors_file: Option<PathBuf>,
    pub authors_prog: Option<PathBuf>,
    pub git_ignore_file: Option<PathBuf>,
    pub max_retries: u32,
    /// Minimum time between conversion attempts; `None` means every cycle.
    pub fetch_interval: Option<Duration>,
    /// Opt-in to killing a stalled fetch by I/O-inactivity timeout.
    pub allow_inactivity_timeout: bool,
}

impl RepoDescriptor {
    /// Build a descriptor with built-in defaults for everything optional.
    pub fn new(
        code_host: &str,
        org: &str,
        repo_name: &str,
        server_key: impl Into<ServerKey>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            repo_key: RepoKey::derive(code_host, org, repo_name),
            server_key: server_key.into(),
            vcs: VcsType::Svn,
            url: url.into(),
            code_host_name: code_host.to_string(),
            org_name: org.to_string(),
            repo_name: repo_name.to_string(),
            repo_root_url: None,
            username: None,
            password: None,
            layout: SvnLayout::Standard,
            git_default_branch: DEFAULT_GIT_DEFAULT_BRANCH.to_string(),
            bare_clone: true,
            default_branch_only: false,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            authors_file: None,
            authors_prog: None,
            git_ignore_file: None,
            max_retries: DEFAULT_MAX_RETRIES,
            fetch_interval: None,
            allow_inactivity_timeout: false,
        }
    }

    /// On-disk directory of the converted repo under the serve root:
    /// `<serve_root>/<code-host>/<org>/<repo>[.git]`.
    pub fn clone_dir(&self, serve_root: &Path) -> PathBuf {
        let mut dir = serve_root.to_path_buf();
        let mut segments = self.repo_key.as_str().split('/').peekable();
        while let Some(seg) = segments.next() {
            if segments.peek().is_none() && self.bare_clone {
                dir.push(format!("{seg}.git"));
            } else {
                dir.push(seg);
            }
        }
        dir
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
