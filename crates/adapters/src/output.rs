// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded capture of child output.
//!
//! Conversion fetches can print one line per revision for days; records
//! and log events must stay bounded. Truncation always keeps the tail:
//! the diagnostic signal of `git svn` failures is in the last lines, not
//! the first.

use serde::{Deserialize, Serialize};

/// Caps applied to captured output before it enters a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCaps {
    /// Maximum lines kept (the most recent ones).
    pub max_lines: usize,
    /// Maximum characters kept per line.
    pub max_line_len: usize,
}

impl Default for OutputCaps {
    fn default() -> Self {
        Self {
            max_lines: 20,
            max_line_len: 200,
        }
    }
}

/// Marker appended to a line clipped at the length cap.
const LINE_CLIP_MARKER: &str = "…";

/// Line-oriented output after truncation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// The kept (most recent) lines, each clipped to the line-length cap.
    pub lines: Vec<String>,
    /// Lines dropped from the front.
    pub dropped: usize,
    /// Total lines the child produced.
    pub total: usize,
}

impl CapturedOutput {
    /// Truncate `lines` under `caps`, keeping the tail.
    pub fn truncate(lines: Vec<String>, caps: OutputCaps) -> Self {
        let total = lines.len();
        let dropped = total.saturating_sub(caps.max_lines);
        let lines = lines
            .into_iter()
            .skip(dropped)
            .map(|line| clip_line(line, caps.max_line_len))
            .collect();
        Self {
            lines,
            dropped,
            total,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Whether any kept line contains `needle`.
    pub fn any_line_contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }

    /// Rendering for log events: an explicit truncation marker first,
    /// then the kept tail.
    pub fn for_log(&self) -> Vec<String> {
        if self.dropped == 0 {
            return self.lines.clone();
        }
        let mut out = Vec::with_capacity(self.lines.len() + 1);
        out.push(format!("[... {} earlier lines truncated ...]", self.dropped));
        out.extend(self.lines.iter().cloned());
        out
    }
}

fn clip_line(line: String, max_len: usize) -> String {
    if line.chars().count() <= max_len {
        return line;
    }
    let mut clipped: String = line.chars().take(max_len.saturating_sub(1)).collect();
    clipped.push_str(LINE_CLIP_MARKER);
    clipped
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
