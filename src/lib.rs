//! depsync - keep deps.edn and flake.nix git pins in agreement.
//!
//! Clojure projects packaged with Nix pin their git dependencies twice:
//! once in `deps.edn` (`:git/url` + `:git/sha`) for tools.deps, and once
//! in `flake.nix` as flake inputs for the Nix build. The two drift apart
//! as upstreams move. depsync reconciles them: it scans the manifest for
//! git pins, resolves each repository's current default-branch revision,
//! matches entries to flake inputs, and rewrites stale pins in both
//! files while leaving everything else alone.
//!
//! # Architecture
//!
//! The run is a pipeline of small, separately testable stages:
//!
//! - [`manifest`] - EDN manifest loading, git-dependency scanning with
//!   exact location paths, and structural pin rewriting
//! - [`git`] - repository URL normalization ([`git::RepoRef`]) and
//!   remote HEAD resolution via `git ls-remote`
//! - [`flake`] - line-oriented flake input scanning, dependency/input
//!   matching, and in-place URL patching
//! - [`sync`] - the reconciliation engine tying the stages together
//!   into a change set plus a per-entry report
//! - [`locks`] - optional post-step invoking the external lock
//!   regeneration tools
//! - [`edn`] - the minimal EDN reader/writer backing [`manifest`]
//! - [`cli`], [`core`] - command-line surface and error taxonomy
//!
//! # Behavior guarantees
//!
//! - Entries whose pin already matches upstream are never rewritten; a
//!   steady-state run writes nothing.
//! - A repository that cannot be resolved skips only its own entry.
//! - `--override owner/repo=rev` forces a revision without querying the
//!   remote at all.
//! - `--dry-run` computes and prints the full report and touches no
//!   file.
//! - File rewrites are computed fully in memory and written once per
//!   file, so an interrupted run never leaves a half-written file.

pub mod cli;
pub mod core;
pub mod edn;
pub mod flake;
pub mod git;
pub mod locks;
pub mod manifest;
pub mod sync;
