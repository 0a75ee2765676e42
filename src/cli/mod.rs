//! Command-line interface for depsync.
//!
//! One command, flag driven:
//!
//! ```bash
//! # update every git pin in deps.edn and flake.nix
//! depsync
//!
//! # preview without writing anything
//! depsync --dry-run
//!
//! # pin one repository to a chosen revision instead of its HEAD
//! depsync --override acme/lib-a=ddd444
//!
//! # update only the named coordinates
//! depsync io.github.acme/lib-a
//!
//! # refresh flake.lock and deps-lock.json afterwards
//! depsync --update-locks
//! ```
//!
//! Exit codes: `0` on success, including a run that found nothing to
//! update; `1` for invalid arguments or missing input files.
//!
//! The report prints one line per entry showing the current pin, the
//! resolved (or overridden) revision and the flake-input outcome, then
//! a summary of files changed. A dry run prints the identical report
//! followed by an explicit notice that nothing was written.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use crate::core::SyncError;
use crate::flake::FlakeFile;
use crate::locks;
use crate::manifest::Manifest;
use crate::sync::{self, EntryStatus, MatchOutcome, PlanOptions, SyncPlan};

/// Revisions are long; the report shows a prefix.
const DISPLAY_REV_LEN: usize = 12;

/// Synchronize pinned Git dependencies between deps.edn and flake.nix.
///
/// Scans the manifest for git dependencies, resolves each repository's
/// current default-branch revision, and rewrites stale pins in both
/// files. Entries that are already current are never touched.
#[derive(Debug, Parser)]
#[command(name = "depsync", version, about)]
pub struct Cli {
    /// Restrict the run to these manifest coordinates.
    ///
    /// All git dependencies are considered when empty.
    #[arg(value_name = "DEPS")]
    pub deps: Vec<String>,

    /// Path to the dependency manifest.
    #[arg(long, value_name = "FILE", default_value = "deps.edn")]
    pub deps_file: PathBuf,

    /// Path to the flake file.
    #[arg(long, value_name = "FILE", default_value = "flake.nix")]
    pub flake_file: PathBuf,

    /// Pin a repository to a fixed revision instead of resolving its HEAD.
    ///
    /// May be given multiple times. The key is the normalized owner/repo
    /// pair of the dependency's git URL.
    #[arg(
        long = "override",
        value_name = "OWNER/REPO=REVISION",
        value_parser = parse_override
    )]
    pub overrides: Vec<(String, String)>,

    /// Regenerate flake.lock and deps-lock.json after rewriting.
    #[arg(long)]
    pub update_locks: bool,

    /// Compute and print the full report without writing any file.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress all output except errors.
    #[arg(long, short)]
    pub quiet: bool,

    /// Also report entries that are already current or filtered out.
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Run the synchronization.
    pub async fn execute(self) -> Result<()> {
        let mut manifest = Manifest::load(&self.deps_file).with_context(|| {
            format!(
                "cannot read the dependency manifest ({})",
                self.deps_file.display()
            )
        })?;
        let mut flake = FlakeFile::load(&self.flake_file).with_context(|| {
            format!("cannot read the flake file ({})", self.flake_file.display())
        })?;

        let options = PlanOptions {
            overrides: self.overrides.iter().cloned().collect::<HashMap<_, _>>(),
            only: self.deps.clone(),
        };

        let plan = sync::plan(&manifest, &flake, &options).await;

        if !self.quiet {
            render_report(&plan, self.verbose);
        }

        if plan.changes.is_empty() {
            if !self.quiet {
                println!("{}", "Everything up to date".green());
            }
            return Ok(());
        }

        if self.dry_run {
            if !self.quiet {
                println!();
                println!(
                    "{} {}",
                    "Dry run".yellow().bold(),
                    "- no files were modified".yellow()
                );
            }
            return Ok(());
        }

        sync::apply(&mut manifest, &mut flake, &plan.changes)?;

        if !self.quiet {
            println!();
            let mut written = vec![self.deps_file.display().to_string()];
            if !plan.changes.flake.is_empty() {
                written.push(self.flake_file.display().to_string());
            }
            println!(
                "{} {} dependenc{} updated, wrote {}",
                "✓".green(),
                plan.changes.manifest.len(),
                if plan.changes.manifest.len() == 1 { "y" } else { "ies" },
                written.join(", ")
            );
        }

        if self.update_locks {
            self.regenerate_locks().await;
        }

        Ok(())
    }

    /// Run the lock collaborators and report their outcome.
    ///
    /// Failures are reported, never propagated: the manifest and flake
    /// rewrites stand regardless, and regeneration can be retried.
    async fn regenerate_locks(&self) {
        let project_dir = self
            .deps_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);

        for run in locks::regenerate(&project_dir).await {
            if run.success {
                if !self.quiet {
                    println!("{} {}", "✓".green(), run.command);
                }
            } else if let Some(failure) = run.failure {
                eprintln!("{} {}", "✗".red(), failure);
                if let SyncError::Collaborator { stderr, .. } = &failure {
                    for line in stderr.lines() {
                        eprintln!("    {}", line.dimmed());
                    }
                }
                eprintln!("  files were updated; rerun the lock step after fixing this");
            }
        }
    }
}

/// Parse an `OWNER/REPO=REVISION` override.
fn parse_override(value: &str) -> Result<(String, String), String> {
    let (key, rev) = value
        .split_once('=')
        .ok_or_else(|| format!("expected OWNER/REPO=REVISION, got {value:?}"))?;
    if key.split('/').filter(|s| !s.is_empty()).count() != 2 {
        return Err(format!("override key must be OWNER/REPO, got {key:?}"));
    }
    if rev.is_empty() {
        return Err("override revision must not be empty".to_string());
    }
    Ok((key.to_string(), rev.to_string()))
}

/// Print the per-entry report.
fn render_report(plan: &SyncPlan, verbose: bool) {
    for report in &plan.reports {
        match &report.status {
            EntryStatus::Updated { new_rev, via_override } => {
                let source = if *via_override { " (override)".dimmed().to_string() } else { String::new() };
                println!(
                    "  {} {} → {}{}",
                    report.name.cyan(),
                    short_rev(&report.current_rev).yellow(),
                    short_rev(new_rev).green(),
                    source
                );
                match &report.matched {
                    MatchOutcome::Matched { input, new_url } => {
                        println!("    flake input {} → {}", input.cyan(), new_url.green());
                    }
                    MatchOutcome::NoMatch => {
                        println!(
                            "    {}",
                            "no matching flake input, manifest only".yellow()
                        );
                    }
                    MatchOutcome::NotAttempted => {}
                }
            }
            EntryStatus::UpToDate => {
                if verbose {
                    println!(
                        "  {} {} {}",
                        report.name.cyan(),
                        short_rev(&report.current_rev).dimmed(),
                        "up to date".dimmed()
                    );
                }
            }
            EntryStatus::Failed(failure) => {
                println!(
                    "  {} {}: {}",
                    report.name.cyan(),
                    "skipped".yellow(),
                    failure
                );
            }
            EntryStatus::Filtered => {
                if verbose {
                    println!("  {} {}", report.name.cyan(), "filtered out".dimmed());
                }
            }
        }
    }
}

fn short_rev(rev: &str) -> &str {
    &rev[..rev.len().min(DISPLAY_REV_LEN)]
}
