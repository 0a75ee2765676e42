//! The reconciliation engine: scan, resolve, match, diff, rewrite.
//!
//! [`plan`] compares every Git dependency in the manifest against live
//! upstream state (or a user override) and produces a [`ChangeSet`]
//! together with a per-entry [`EntryReport`] for display. Planning never
//! touches the filesystem, so a dry run is simply a plan that is printed
//! and not applied. [`apply`] performs the rewrite.
//!
//! Per-entry work is independent: an entry that fails to resolve is
//! skipped with a logged failure, an entry whose pin already matches
//! upstream contributes nothing, and neither affects any other entry.
//! Remote queries run concurrently with a bounded window, but results
//! are collected back in discovery order so the change set, the report
//! and the resulting file diffs are deterministic.

use std::collections::HashMap;

use anyhow::Result;
use futures::stream::{self, StreamExt};

use crate::flake::{self, FlakeFile};
use crate::git::{self, RepoRef, ResolutionFailure};
use crate::manifest::{DependencyEntry, Manifest};

/// Remote queries allowed in flight at once.
const MAX_IN_FLIGHT: usize = 8;

/// One pending manifest rewrite.
#[derive(Debug, Clone)]
pub struct ManifestChange {
    /// Dependency coordinate.
    pub name: String,
    /// Location path of the entry in the manifest.
    pub path: Vec<String>,
    /// Pin key to write under.
    pub rev_key: String,
    /// Revision currently in the file.
    pub old_rev: String,
    /// Revision to write.
    pub new_rev: String,
    /// Whether the revision came from `--override`.
    pub via_override: bool,
}

/// One pending flake rewrite.
///
/// Only ever created alongside the manifest change for the same
/// dependency; the flake is never updated on its own.
#[derive(Debug, Clone)]
pub struct FlakeChange {
    /// Input name.
    pub input: String,
    /// Line carrying the URL declaration.
    pub line: usize,
    /// URL currently on that line.
    pub old_url: String,
    /// URL to write.
    pub new_url: String,
}

/// Everything a run wants to rewrite.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Manifest updates, in discovery order.
    pub manifest: Vec<ManifestChange>,
    /// Flake updates, in the order their entries were discovered.
    pub flake: Vec<FlakeChange>,
}

impl ChangeSet {
    /// True when there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty() && self.flake.is_empty()
    }
}

/// What happened to one entry during planning.
#[derive(Debug)]
pub enum EntryStatus {
    /// A newer revision was found (or forced by an override).
    Updated {
        /// The revision that will be written.
        new_rev: String,
        /// Whether it came from `--override`.
        via_override: bool,
    },
    /// The pin already matches upstream; nothing to do.
    UpToDate,
    /// The revision could not be resolved; the entry is skipped.
    Failed(ResolutionFailure),
    /// Excluded by the positional coordinate filter.
    Filtered,
}

/// Outcome of the flake-input lookup for one updated entry.
#[derive(Debug)]
pub enum MatchOutcome {
    /// A matching input was found.
    Matched {
        /// Input name.
        input: String,
        /// The pinned URL computed for it.
        new_url: String,
    },
    /// No input matched; only the manifest is updated.
    NoMatch,
    /// The entry was not updated, so no lookup was attempted.
    NotAttempted,
}

/// Per-entry planning report, in discovery order.
#[derive(Debug)]
pub struct EntryReport {
    /// Dependency coordinate.
    pub name: String,
    /// Revision currently pinned in the manifest.
    pub current_rev: String,
    /// Resolution outcome.
    pub status: EntryStatus,
    /// Flake lookup outcome.
    pub matched: MatchOutcome,
}

/// Inputs to [`plan`] beyond the two files.
#[derive(Debug, Default)]
pub struct PlanOptions {
    /// `owner/repo` to revision, from `--override`.
    pub overrides: HashMap<String, String>,
    /// Coordinates to restrict the run to; empty means all.
    pub only: Vec<String>,
}

/// A computed plan: the change set plus the report that explains it.
#[derive(Debug)]
pub struct SyncPlan {
    /// Pending rewrites.
    pub changes: ChangeSet,
    /// One report per scanned entry.
    pub reports: Vec<EntryReport>,
}

enum Resolution {
    Filtered,
    Pinned { rev: String, via_override: bool },
    Failed(ResolutionFailure),
}

/// Compute the change set for a manifest/flake pair.
///
/// Pure with respect to the filesystem; call [`apply`] to write.
pub async fn plan(manifest: &Manifest, flake: &FlakeFile, options: &PlanOptions) -> SyncPlan {
    let entries = manifest.scan();
    let resolutions = resolve_all(&entries, options).await;

    let mut changes = ChangeSet::default();
    let mut reports = Vec::with_capacity(entries.len());

    for (entry, resolution) in entries.iter().zip(resolutions) {
        let (status, matched) = match resolution {
            Resolution::Filtered => (EntryStatus::Filtered, MatchOutcome::NotAttempted),
            Resolution::Failed(failure) => {
                tracing::warn!(
                    dependency = entry.name.as_str(),
                    error = %failure,
                    "skipping entry, revision could not be resolved"
                );
                (EntryStatus::Failed(failure), MatchOutcome::NotAttempted)
            }
            Resolution::Pinned { rev, via_override } => {
                if rev == entry.rev {
                    (EntryStatus::UpToDate, MatchOutcome::NotAttempted)
                } else {
                    changes.manifest.push(ManifestChange {
                        name: entry.name.clone(),
                        path: entry.path.clone(),
                        rev_key: entry.rev_key.clone(),
                        old_rev: entry.rev.clone(),
                        new_rev: rev.clone(),
                        via_override,
                    });
                    let matched = match flake::match_input(entry, flake.inputs()) {
                        Some(input) => {
                            let new_url = flake::pinned_url(&input.url, &rev);
                            if new_url != input.url {
                                changes.flake.push(FlakeChange {
                                    input: input.name.clone(),
                                    line: input.line,
                                    old_url: input.url.clone(),
                                    new_url: new_url.clone(),
                                });
                            }
                            MatchOutcome::Matched { input: input.name.clone(), new_url }
                        }
                        None => {
                            tracing::warn!(
                                dependency = entry.name.as_str(),
                                "no matching flake input, updating the manifest only"
                            );
                            MatchOutcome::NoMatch
                        }
                    };
                    (EntryStatus::Updated { new_rev: rev, via_override }, matched)
                }
            }
        };
        reports.push(EntryReport {
            name: entry.name.clone(),
            current_rev: entry.rev.clone(),
            status,
            matched,
        });
    }

    SyncPlan { changes, reports }
}

/// Resolve every entry with a bounded concurrency window, preserving
/// entry order in the result.
async fn resolve_all(entries: &[DependencyEntry], options: &PlanOptions) -> Vec<Resolution> {
    stream::iter(entries.iter().map(|entry| resolve_one(entry, options)))
        .buffered(MAX_IN_FLIGHT)
        .collect()
        .await
}

async fn resolve_one(entry: &DependencyEntry, options: &PlanOptions) -> Resolution {
    if !options.only.is_empty() && !options.only.iter().any(|name| name == &entry.name) {
        return Resolution::Filtered;
    }

    // an override wins without ever querying the remote
    if let Some(key) = RepoRef::parse(&entry.url).map(|r| r.override_key()) {
        if let Some(rev) = options.overrides.get(&key) {
            tracing::debug!(
                dependency = entry.name.as_str(),
                key = key.as_str(),
                "using override revision"
            );
            return Resolution::Pinned { rev: rev.clone(), via_override: true };
        }
    }

    match git::resolve_head(&entry.url).await {
        Ok(rev) => Resolution::Pinned { rev, via_override: false },
        Err(failure) => Resolution::Failed(failure),
    }
}

/// Apply a change set to both files.
///
/// All in-memory edits happen before either file is written, and each
/// file is written at most once.
pub fn apply(manifest: &mut Manifest, flake: &mut FlakeFile, changes: &ChangeSet) -> Result<()> {
    for change in &changes.manifest {
        manifest.set_revision(&change.path, &change.rev_key, &change.new_rev)?;
    }
    for change in &changes.flake {
        flake.rewrite_url(change.line, &change.old_url, &change.new_url)?;
    }
    if !changes.manifest.is_empty() {
        manifest.save()?;
    }
    if !changes.flake.is_empty() {
        flake.save()?;
    }
    Ok(())
}
