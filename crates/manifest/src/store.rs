// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The resolved repository store.
//!
//! One immutable snapshot per cycle. Configuration errors are fatal at
//! startup; at reload the caller keeps the previous snapshot and logs a
//! warning instead (spec'd behaviour for a long-running supervisor).

use crate::raw::RawManifest;
use indexmap::IndexMap;
use rc_core::{RedactionSink, RepoDescriptor, RepoKey, ServerKey};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("manifest top level must be a mapping")]
    NotAMapping,

    #[error("section '{0}' is malformed: {1}")]
    BadSection(String, #[source] serde_yaml::Error),

    #[error("server group name must not be empty")]
    EmptyServerKey,

    #[error("repo '{repo}' in server '{server}' has no url and the server has no repo-parent-url")]
    MissingUrl { server: String, repo: String },

    #[error("duplicate repo key '{0}' (two repos resolve to the same on-disk directory)")]
    DuplicateRepoKey(RepoKey),

    #[error("repo '{repo}': {reason}")]
    BadRepo { repo: String, reason: String },
}

/// Identity and gating overrides of one server group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGroup {
    pub server_key: ServerKey,
    pub code_host_name: String,
    /// Overrides `MAX_CONCURRENT_CONVERSIONS_PER_SERVER` when present.
    pub max_concurrent: Option<u32>,
}

/// Immutable snapshot of every declared repo, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RepoStore {
    repos: IndexMap<RepoKey, RepoDescriptor>,
    servers: IndexMap<ServerKey, ServerGroup>,
}

impl RepoStore {
    /// Load and resolve the manifest at `path`. Secrets are registered
    /// with `sink` as they are read, before any log line can see them.
    /// `base` sits below the file's own `global` section in the merge
    /// order; the daemon feeds environment-derived defaults through it.
    pub fn load(
        path: &Path,
        sink: &RedactionSink,
        base: &crate::Settings,
    ) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_str_with(&text, sink, base)
    }

    /// Resolve manifest text with built-in defaults only.
    pub fn from_str(text: &str, sink: &RedactionSink) -> Result<Self, ManifestError> {
        Self::from_str_with(text, sink, &crate::Settings::default())
    }

    /// Resolve manifest text into a store. Split out of [`Self::load`]
    /// for tests that do not want to touch the filesystem.
    pub fn from_str_with(
        text: &str,
        sink: &RedactionSink,
        base: &crate::Settings,
    ) -> Result<Self, ManifestError> {
        let raw = RawManifest::parse(text)?;
        for key in &raw.unknown {
            warn!(key, "ignoring unknown top-level manifest key");
        }

        let mut store = Self::default();
        for (server_name, server) in &raw.servers {
            if server_name.is_empty() {
                return Err(ManifestError::EmptyServerKey);
            }
            for key in server.unknown.keys() {
                warn!(server = server_name.as_str(), key, "ignoring unknown server key");
            }

            let server_key = ServerKey::new(server_name.clone());
            let server_settings = server.settings.overlay(&raw.global.overlay(base));
            store.servers.insert(
                server_key.clone(),
                ServerGroup {
                    server_key: server_key.clone(),
                    code_host_name: server.code_host_name.clone(),
                    max_concurrent: server.max_concurrent_conversions,
                },
            );

            for (repo_name, repo) in &server.repos {
                for key in repo.unknown.keys() {
                    warn!(
                        server = server_name.as_str(),
                        repo = repo_name.as_str(),
                        key,
                        "ignoring unknown repo key"
                    );
                }

                let merged = repo.settings.overlay(&server_settings);

                // Register credentials before the descriptor exists, so
                // even an error path below cannot leak them.
                if let Some(username) = &merged.username {
                    sink.register(username.clone());
                }
                if let Some(password) = &merged.password {
                    sink.register(password.clone());
                }

                let name = repo.git_repo_name.as_deref().unwrap_or(repo_name);
                let org = repo
                    .git_org_name
                    .as_deref()
                    .or(server.git_org_name.as_deref())
                    .unwrap_or(server_name);

                let url = match (&repo.url, &server.repo_parent_url) {
                    (Some(url), _) => url.clone(),
                    (None, Some(parent)) => {
                        format!("{}/{}", parent.trim_end_matches('/'), repo_name)
                    }
                    (None, None) => {
                        return Err(ManifestError::MissingUrl {
                            server: server_name.clone(),
                            repo: repo_name.clone(),
                        })
                    }
                };

                let layout = merged.resolve_layout().map_err(|reason| {
                    ManifestError::BadRepo {
                        repo: repo_name.clone(),
                        reason,
                    }
                })?;

                let batch = merged.fetch_batch_size_or_default();
                if batch == 0 {
                    return Err(ManifestError::BadRepo {
                        repo: repo_name.clone(),
                        reason: "fetch-batch-size must be positive".to_string(),
                    });
                }

                let mut desc = RepoDescriptor::new(
                    &server.code_host_name,
                    org,
                    name,
                    server_key.clone(),
                    url,
                );
                desc.vcs = repo.r#type;
                desc.repo_root_url = server.repo_parent_url.clone();
                desc.username = merged.username.clone();
                desc.password = merged.password.clone();
                desc.layout = layout;
                desc.git_default_branch = merged.git_default_branch_or_default();
                desc.bare_clone = merged.bare_clone.unwrap_or(true);
                desc.default_branch_only = merged.default_branch_only.unwrap_or(false);
                desc.fetch_batch_size = batch;
                desc.authors_file = merged.authors_file_path.clone();
                desc.authors_prog = merged.authors_prog_path.clone();
                desc.git_ignore_file = merged.git_ignore_file_path.clone();
                desc.max_retries = merged.max_retries_or_default();
                desc.fetch_interval = merged.fetch_interval();
                desc.allow_inactivity_timeout =
                    merged.allow_inactivity_timeout.unwrap_or(false);

                let key = desc.repo_key.clone();
                if store.repos.insert(key.clone(), desc).is_some() {
                    return Err(ManifestError::DuplicateRepoKey(key));
                }
            }
        }
        Ok(store)
    }

    /// Repos in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &RepoDescriptor> {
        self.repos.values()
    }

    pub fn get(&self, key: &RepoKey) -> Option<&RepoDescriptor> {
        self.repos.get(key)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Server groups in declaration order.
    pub fn servers(&self) -> impl Iterator<Item = &ServerGroup> {
        self.servers.values()
    }

    pub fn server(&self, key: &ServerKey) -> Option<&ServerGroup> {
        self.servers.get(key)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
