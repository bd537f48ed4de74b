// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serde shapes for the manifest file, before merging.
//!
//! The file is a mapping whose `global` key holds defaults and whose
//! every other key names a server group. Unknown keys at any level are
//! collected rather than rejected, so an operator typo degrades to a
//! warning instead of taking the whole supervisor down.

use crate::merge::Settings;
use crate::store::ManifestError;
use indexmap::IndexMap;
use rc_core::VcsType;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Whole manifest file: global defaults plus server groups in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct RawManifest {
    pub global: Settings,
    pub servers: IndexMap<String, RawServer>,
    /// Top-level keys that are neither `global` nor a server mapping.
    pub unknown: Vec<String>,
}

impl RawManifest {
    /// Parse manifest text. The top level is split by hand so that a
    /// stray scalar key warns instead of failing the whole file, while a
    /// malformed server group still errors with its name attached.
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        // An empty file is a valid manifest with nothing to convert.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        if doc.is_null() {
            return Ok(Self::default());
        }
        let serde_yaml::Value::Mapping(map) = doc else {
            return Err(ManifestError::NotAMapping);
        };

        let mut manifest = Self::default();
        for (key, value) in map {
            let Some(key) = key.as_str().map(str::to_string) else {
                manifest.unknown.push(format!("{key:?}"));
                continue;
            };
            if key == "global" {
                manifest.global = serde_yaml::from_value(value)
                    .map_err(|e| ManifestError::BadSection("global".to_string(), e))?;
            } else if value.is_mapping() {
                let server: RawServer = serde_yaml::from_value(value)
                    .map_err(|e| ManifestError::BadSection(key.clone(), e))?;
                manifest.servers.insert(key, server);
            } else {
                manifest.unknown.push(key);
            }
        }
        Ok(manifest)
    }
}

/// One named server group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawServer {
    /// Code-host identity; required per server.
    pub code_host_name: String,
    /// Base URL that repo URLs are resolved against when a repo declares
    /// no `url` of its own.
    #[serde(default)]
    pub repo_parent_url: Option<String>,
    /// Per-server override of the per-server concurrency cap.
    #[serde(default)]
    pub max_concurrent_conversions: Option<u32>,
    /// Default org for repos in this group; a repo may override it.
    #[serde(default)]
    pub git_org_name: Option<String>,
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(default)]
    pub repos: IndexMap<String, RawRepo>,
    /// Anything we did not recognise; warned about, never fatal.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

/// One declared repo.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawRepo {
    /// Source VCS; required.
    pub r#type: VcsType,
    /// Remote URL. May be omitted when the server declares
    /// `repo-parent-url`; then `<parent>/<repo name>` is used.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub git_org_name: Option<String>,
    /// Overrides the map key as the repo's name.
    #[serde(default)]
    pub git_repo_name: Option<String>,
    #[serde(flatten)]
    pub settings: Settings,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, serde_yaml::Value>,
}

#[cfg(test)]
#[path = "raw_tests.rs"]
mod tests;
