// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-manifest: the repos-to-convert manifest.
//!
//! Parses the three-level YAML (global defaults, named server groups,
//! per-repo entries), merges settings repo > server > global > built-in,
//! derives stable repo keys, and produces an immutable [`RepoStore`]
//! snapshot per cycle. Secrets are registered with the redaction sink at
//! read time, before anything can be logged.

pub mod merge;
pub mod raw;
pub mod store;
pub mod validate;

pub use merge::Settings;
pub use raw::{RawManifest, RawRepo, RawServer};
pub use store::{ManifestError, RepoStore, ServerGroup};
pub use validate::lint;
