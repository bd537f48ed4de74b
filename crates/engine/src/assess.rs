// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase-G classification: did the fetch actually work?
//!
//! `git svn fetch` often exits 0 after doing nothing, so success is
//! defined in terms of observable progress: the converted tip must have
//! advanced AND the output must show committed revisions. Everything
//! else is classified by the error tokens in the captured tail.

use rc_adapters::CapturedOutput;

/// Output substrings that mark a transient remote failure worth
/// retrying with backoff and a smaller log window.
const TRANSIENT_TOKENS: &[&str] = &[
    "Connection timed out",
    "Connection reset",
    "Connection refused",
    "connection closed",
    "Unable to connect",
    "Network connection closed unexpectedly",
    "too many requests",
    "429",
    "502 Bad Gateway",
    "503 Service Unavailable",
    "504 Gateway Timeout",
    "Temporary failure in name resolution",
];

/// Output substrings that mark an authentication failure. Retried
/// without shrinking the window: a smaller batch will not fix a bad
/// password.
const AUTH_TOKENS: &[&str] = &[
    "Authorization failed",
    "Authentication failed",
    "401 Unauthorized",
    "403 Forbidden",
    "Username:",
];

/// Classification of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAssessment {
    /// Tip advanced and the tool reported committed revisions.
    Progress { before: u64, after: u64 },
    /// No progress, but a recognisable transient error token.
    Transient { token: String },
    /// No progress, auth error token.
    AuthFailure { token: String },
    /// No progress and no recognisable signal. The tool-contract
    /// violation case; treated as transient with backoff.
    Silent,
    /// The tip moved backwards. Never retried.
    Corruption { before: u64, after: u64 },
}

/// Whether a line is the tool's per-committed-revision report,
/// `r<rev> = <oid> (<ref>)`.
pub fn is_committed_line(line: &str) -> bool {
    let Some(rest) = line.strip_prefix('r') else {
        return false;
    };
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    digits > 0 && rest[digits..].starts_with(" = ")
}

/// Classify a finished fetch from the tip before/after and the captured
/// output. `before`/`after` are `None` when no revision has ever been
/// converted (fresh clone).
pub fn assess(
    before: Option<u64>,
    after: Option<u64>,
    output: &CapturedOutput,
) -> FetchAssessment {
    let before_rev = before.unwrap_or(0);
    let committed = output.lines.iter().any(|l| is_committed_line(l));

    if let Some(after_rev) = after {
        if after_rev > before_rev && committed {
            return FetchAssessment::Progress {
                before: before_rev,
                after: after_rev,
            };
        }
        if after_rev < before_rev {
            return FetchAssessment::Corruption {
                before: before_rev,
                after: after_rev,
            };
        }
    }

    if let Some(token) = find_token(output, AUTH_TOKENS) {
        return FetchAssessment::AuthFailure { token };
    }
    if let Some(token) = find_token(output, TRANSIENT_TOKENS) {
        return FetchAssessment::Transient { token };
    }
    FetchAssessment::Silent
}

fn find_token(output: &CapturedOutput, tokens: &[&str]) -> Option<String> {
    for line in &output.lines {
        for token in tokens {
            if line.contains(token) {
                return Some((*token).to_string());
            }
        }
    }
    None
}

#[cfg(test)]
#[path = "assess_tests.rs"]
mod tests;
