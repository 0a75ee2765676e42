//! Core types shared across depsync.
//!
//! This module holds the typed error taxonomy used throughout the crate.
//! Strongly-typed errors ([`SyncError`]) cover the fatal failure modes
//! (unreadable input files, failed writes, collaborator subprocesses),
//! while per-entry resolution failures live next to the resolver in
//! [`crate::git::ResolutionFailure`] because they are non-fatal and are
//! reported inline rather than propagated.
//!
//! Errors are surfaced through [`anyhow`] at the CLI boundary so callers
//! can attach file paths and remediation hints with `.with_context(..)`.

pub mod error;

pub use error::SyncError;
