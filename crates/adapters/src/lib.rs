// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! rc-adapters: everything that touches the operating system.
//!
//! The process runner spawns external tools in their own process groups
//! and captures their output; the process table is the shared registry
//! of tracked children; the svn and git modules build argv for (and
//! parse output of) the installed command-line tools; procfs samples
//! resource usage for the status monitor.

pub mod git;
pub mod output;
pub mod procfs;
pub mod runner;
pub mod svn;
pub mod table;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use output::{CapturedOutput, OutputCaps};
pub use runner::{GroupSignal, ProcessRunner, RunOutcome, RunSpec, RunnerConfig, ToolRunner};
pub use runner::signal_group;
pub use svn::{SvnInfo, SvnParseError};
pub use table::ProcessTable;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeResponse, FakeRunner};
