// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.
//!
//! Every variable is optional; a value that fails to parse falls back
//! to the default with a warning rather than refusing to start.

use rc_adapters::OutputCaps;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MANIFEST_PATH: &str = "/sg/repos-to-convert.yaml";
pub const DEFAULT_SERVE_ROOT: &str = "/sg/src-serve-root";

/// Fully-resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonEnv {
    /// `debug` | `info` | `warning` | `error` | `critical`.
    pub log_level: String,
    /// Main-loop tick.
    pub interval: Duration,
    pub global_cap: usize,
    pub per_server_cap: usize,
    /// 0 means run until signalled.
    pub max_cycles: u64,
    /// Default retry budget for repos whose manifest is silent.
    pub max_retries: u32,
    pub status_monitor_interval: Duration,
    pub concurrency_monitor_interval: Duration,
    pub output_caps: OutputCaps,
    pub manifest_path: PathBuf,
    pub serve_root: PathBuf,
    /// `BUILD_*` passthrough, attached to the startup event.
    pub build_metadata: Vec<(String, String)>,
}

impl DaemonEnv {
    /// Read configuration from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), collect_build_vars())
    }

    /// Resolve from an arbitrary lookup, for tests.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        build_metadata: Vec<(String, String)>,
    ) -> Self {
        Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            interval: Duration::from_secs(parse_positive(
                &lookup,
                "REPO_CONVERTER_INTERVAL_SECONDS",
                3600,
            )),
            global_cap: parse_positive(&lookup, "MAX_CONCURRENT_CONVERSIONS_GLOBAL", 10) as usize,
            per_server_cap: parse_positive(&lookup, "MAX_CONCURRENT_CONVERSIONS_PER_SERVER", 10)
                as usize,
            max_cycles: parse_non_negative(&lookup, "MAX_CYCLES", 0),
            max_retries: parse_non_negative(&lookup, "MAX_RETRIES", 3) as u32,
            status_monitor_interval: Duration::from_secs(parse_positive(
                &lookup,
                "STATUS_MONITOR_INTERVAL",
                60,
            )),
            concurrency_monitor_interval: Duration::from_secs(parse_positive(
                &lookup,
                "CONCURRENCY_MONITOR_INTERVAL",
                30,
            )),
            output_caps: OutputCaps {
                max_lines: parse_positive(&lookup, "TRUNCATED_OUTPUT_MAX_LINES", 20) as usize,
                max_line_len: parse_positive(&lookup, "TRUNCATED_OUTPUT_MAX_LINE_LENGTH", 200)
                    as usize,
            },
            manifest_path: lookup("REPOS_TO_CONVERT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH)),
            serve_root: lookup("SRC_SERVE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVE_ROOT)),
            build_metadata,
        }
    }

    /// The tracing filter directive for `log_level`, unless the caller
    /// already set `RUST_LOG` (which wins).
    pub fn filter_directive(&self) -> &'static str {
        match self.log_level.to_ascii_lowercase().as_str() {
            "debug" => "debug",
            "warning" => "warn",
            // Everything past error is fatal-only; tracing has no
            // `critical`, so the closest level is used.
            "error" | "critical" => "error",
            _ => "info",
        }
    }
}

fn collect_build_vars() -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = std::env::vars()
        .filter(|(key, _)| key.starts_with("BUILD_"))
        .collect();
    vars.sort();
    vars
}

/// Parse a positive integer variable; zero and garbage fall back.
fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> u64 {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                warn!(key, value = raw.as_str(), default, "ignoring non-positive value");
                default
            }
        },
    }
}

/// Parse a non-negative integer variable; garbage falls back.
fn parse_non_negative(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> u64 {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = raw.as_str(), default, "ignoring unparsable value");
                default
            }
        },
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
