// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-level settings and the three-level merge.
//!
//! The same [`Settings`] block can appear globally, on a server group,
//! and on a repo; any attribute resolves repo > server > global >
//! built-in default.

use rc_core::repo::{
    DEFAULT_FETCH_BATCH_SIZE, DEFAULT_GIT_DEFAULT_BRANCH, DEFAULT_MAX_RETRIES,
};
use rc_core::SvnLayout;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Sentinel accepted for the `layout` key.
pub const LAYOUT_STANDARD: &str = "standard";

/// Optional settings block, identical at every manifest level.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Settings {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bare_clone: Option<bool>,
    #[serde(default)]
    pub git_default_branch: Option<String>,
    #[serde(default)]
    pub default_branch_only: Option<bool>,
    #[serde(default)]
    pub fetch_batch_size: Option<u32>,
    #[serde(default)]
    pub fetch_interval_seconds: Option<u64>,
    /// `standard`, or omitted in favour of explicit paths.
    #[serde(default)]
    pub layout: Option<String>,
    #[serde(default)]
    pub trunk: Option<String>,
    #[serde(default)]
    pub branches: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub git_ignore_file_path: Option<PathBuf>,
    #[serde(default)]
    pub authors_file_path: Option<PathBuf>,
    #[serde(default)]
    pub authors_prog_path: Option<PathBuf>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub allow_inactivity_timeout: Option<bool>,
}

impl Settings {
    /// Overlay `self` (the more specific level) onto `base`.
    ///
    /// Layout-bearing keys move as a unit: a level that says anything
    /// about layout (`layout:` or any of trunk/branches/tags) replaces
    /// the whole layout of the level below, so a repo can override a
    /// server-wide `layout: standard` with explicit paths without the
    /// two half-merging into nonsense.
    pub fn overlay(&self, base: &Settings) -> Settings {
        let layout_here = self.layout.is_some()
            || self.trunk.is_some()
            || self.branches.is_some()
            || self.tags.is_some();
        let (layout, trunk, branches, tags) = if layout_here {
            (
                self.layout.clone(),
                self.trunk.clone(),
                self.branches.clone(),
                self.tags.clone(),
            )
        } else {
            (
                base.layout.clone(),
                base.trunk.clone(),
                base.branches.clone(),
                base.tags.clone(),
            )
        };

        Settings {
            username: self.username.clone().or_else(|| base.username.clone()),
            password: self.password.clone().or_else(|| base.password.clone()),
            bare_clone: self.bare_clone.or(base.bare_clone),
            git_default_branch: self
                .git_default_branch
                .clone()
                .or_else(|| base.git_default_branch.clone()),
            default_branch_only: self.default_branch_only.or(base.default_branch_only),
            fetch_batch_size: self.fetch_batch_size.or(base.fetch_batch_size),
            fetch_interval_seconds: self.fetch_interval_seconds.or(base.fetch_interval_seconds),
            layout,
            trunk,
            branches,
            tags,
            git_ignore_file_path: self
                .git_ignore_file_path
                .clone()
                .or_else(|| base.git_ignore_file_path.clone()),
            authors_file_path: self
                .authors_file_path
                .clone()
                .or_else(|| base.authors_file_path.clone()),
            authors_prog_path: self
                .authors_prog_path
                .clone()
                .or_else(|| base.authors_prog_path.clone()),
            max_retries: self.max_retries.or(base.max_retries),
            allow_inactivity_timeout: self
                .allow_inactivity_timeout
                .or(base.allow_inactivity_timeout),
        }
    }

    /// Resolve the layout of a fully-merged settings block.
    ///
    /// `Err` carries the conflicting spelling when both the `standard`
    /// sentinel and explicit paths appear, or when `layout` names
    /// something other than `standard`.
    pub fn resolve_layout(&self) -> Result<SvnLayout, String> {
        let explicit =
            self.trunk.is_some() || self.branches.is_some() || self.tags.is_some();
        match self.layout.as_deref() {
            Some(LAYOUT_STANDARD) if explicit => Err(
                "layout: standard conflicts with explicit trunk/branches/tags".to_string(),
            ),
            Some(LAYOUT_STANDARD) => Ok(SvnLayout::Standard),
            Some(other) => Err(format!("unknown layout '{other}' (expected 'standard')")),
            None if explicit => Ok(SvnLayout::Explicit {
                trunk: self.trunk.clone(),
                branches: self.branches.clone().unwrap_or_default(),
                tags: self.tags.clone().unwrap_or_default(),
            }),
            None => Ok(SvnLayout::Standard),
        }
    }

    pub fn fetch_batch_size_or_default(&self) -> u32 {
        self.fetch_batch_size.unwrap_or(DEFAULT_FETCH_BATCH_SIZE)
    }

    pub fn max_retries_or_default(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn git_default_branch_or_default(&self) -> String {
        self.git_default_branch
            .clone()
            .unwrap_or_else(|| DEFAULT_GIT_DEFAULT_BRANCH.to_string())
    }

    pub fn fetch_interval(&self) -> Option<Duration> {
        self.fetch_interval_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
#[path = "merge_tests.rs"]
mod tests;
