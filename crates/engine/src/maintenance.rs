// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Post-fetch Git maintenance.
//!
//! Surfaces the remote `git-svn/*` refs as local branches and tags,
//! points HEAD at the configured default branch, and optionally runs a
//! compacting GC. All local filesystem work; a failure here never undoes
//! a successful fetch, it only demotes the outcome to
//! `done_with_warnings`.

use rc_adapters::{git, RunSpec, ToolRunner};
use rc_core::RepoDescriptor;
use std::path::Path;
use tracing::{debug, info, warn};

/// What maintenance did, and what went sideways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub branches_promoted: usize,
    pub tags_promoted: usize,
    /// One entry per name collision, already resolved by precedence.
    pub collisions: Vec<String>,
    /// The branch HEAD ended up on, if any.
    pub head: Option<String>,
    /// HEAD fell back to the first branch because the configured
    /// default does not exist.
    pub head_fallback: bool,
    pub gc_ran: bool,
    /// Non-fatal problems (failed ref updates, missing branches).
    pub warnings: Vec<String>,
}

impl MaintenanceReport {
    /// True when the job should finish `done_with_warnings` instead of
    /// `done`.
    pub fn has_warnings(&self) -> bool {
        !self.collisions.is_empty() || !self.warnings.is_empty()
    }
}

/// A remote ref queued for promotion, in precedence order:
/// trunk first, then branches in ref order, then tags in ref order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Promotion {
    source: String,
    target: String,
    oid: String,
    is_tag: bool,
}

/// Plan which local refs the remote refs become. Pure, for testing.
///
/// Remote layout after `git svn fetch --prefix=git-svn/`:
/// `refs/remotes/git-svn/trunk`, `refs/remotes/git-svn/<branch>`,
/// `refs/remotes/git-svn/tags/<tag>`. Historic-split refs containing
/// `@` are skipped. Collisions resolve by precedence and are reported.
fn plan_promotions(
    refs: &[(String, String)],
    default_branch: &str,
) -> (Vec<Promotion>, Vec<String>) {
    let mut trunk = Vec::new();
    let mut branches = Vec::new();
    let mut tags = Vec::new();

    for (oid, refname) in refs {
        let Some(name) = refname.strip_prefix("refs/remotes/git-svn/") else {
            continue;
        };
        if name.contains('@') {
            debug!(refname = refname.as_str(), "skipping historic split ref");
            continue;
        }
        if let Some(tag) = name.strip_prefix("tags/") {
            tags.push(Promotion {
                source: refname.clone(),
                target: format!("refs/tags/{tag}"),
                oid: oid.clone(),
                is_tag: true,
            });
        } else {
            let promotion = Promotion {
                source: refname.clone(),
                target: format!("refs/heads/{name}"),
                oid: oid.clone(),
                is_tag: false,
            };
            if name == "trunk" || name == default_branch {
                trunk.push(promotion);
            } else {
                branches.push(promotion);
            }
        }
    }

    let mut planned: Vec<Promotion> = Vec::new();
    let mut collisions = Vec::new();
    for candidate in trunk.into_iter().chain(branches).chain(tags) {
        match planned.iter().find(|p| p.target == candidate.target) {
            None => planned.push(candidate),
            Some(winner) => collisions.push(format!(
                "{} and {} both map to {}; keeping {}",
                winner.source, candidate.source, candidate.target, winner.source
            )),
        }
    }
    (planned, collisions)
}

/// Run the full maintenance pass in `git_dir`.
pub async fn run(
    runner: &dyn ToolRunner,
    repo: &RepoDescriptor,
    git_dir: &Path,
    run_gc: bool,
) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    let spec = RunSpec::new(git::for_each_ref_argv("refs/remotes/git-svn/"))
        .cwd(git_dir)
        .repo_key(repo.repo_key.clone());
    let listing = runner.run(spec).await;
    if !listing.success {
        report
            .warnings
            .push(format!("listing remote refs failed: {}", listing.status));
        return report;
    }

    let refs = git::parse_refs(&listing.output.lines);
    let (promotions, collisions) = plan_promotions(&refs, &repo.git_default_branch);
    for collision in &collisions {
        warn!(repo_key = %repo.repo_key, collision = collision.as_str(), "ref collision");
    }
    report.collisions = collisions;

    let mut promoted_branches: Vec<String> = Vec::new();
    for promotion in &promotions {
        let spec = RunSpec::new(git::update_ref_argv(&promotion.target, &promotion.oid))
            .cwd(git_dir)
            .repo_key(repo.repo_key.clone());
        let outcome = runner.run(spec).await;
        if !outcome.success {
            report.warnings.push(format!(
                "update-ref {} failed: {}",
                promotion.target, outcome.status
            ));
            continue;
        }
        if promotion.is_tag {
            report.tags_promoted += 1;
        } else {
            report.branches_promoted += 1;
            if let Some(name) = promotion.target.strip_prefix("refs/heads/") {
                promoted_branches.push(name.to_string());
            }
        }
    }

    // HEAD: configured default when present, else the first branch in
    // precedence order.
    let head_branch = if promoted_branches
        .iter()
        .any(|b| b == &repo.git_default_branch)
    {
        Some(repo.git_default_branch.clone())
    } else {
        let fallback = promoted_branches.first().cloned();
        if let Some(branch) = &fallback {
            info!(
                repo_key = %repo.repo_key,
                wanted = repo.git_default_branch.as_str(),
                using = branch.as_str(),
                "default branch missing, falling back"
            );
            report.head_fallback = true;
        }
        fallback
    };

    match head_branch {
        Some(branch) => {
            let spec = RunSpec::new(git::symbolic_ref_argv(
                "HEAD",
                &format!("refs/heads/{branch}"),
            ))
            .cwd(git_dir)
            .repo_key(repo.repo_key.clone());
            let outcome = runner.run(spec).await;
            if outcome.success {
                report.head = Some(branch);
            } else {
                report
                    .warnings
                    .push(format!("pointing HEAD at {branch} failed: {}", outcome.status));
            }
        }
        None => {
            report
                .warnings
                .push("no branches to point HEAD at".to_string());
        }
    }

    if run_gc {
        let spec = RunSpec::new(git::gc_argv())
            .cwd(git_dir)
            .repo_key(repo.repo_key.clone());
        let outcome = runner.run(spec).await;
        if outcome.success {
            report.gc_ran = true;
        } else {
            report
                .warnings
                .push(format!("git gc failed: {}", outcome.status));
        }
    }

    report
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
