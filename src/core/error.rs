//! Error types for depsync operations.
//!
//! [`SyncError`] enumerates the fatal failure modes. Every variant renders
//! a message that names the file or command involved, so the CLI can print
//! it without further decoration. Non-fatal, per-entry failures (a single
//! repository that could not be resolved) are represented by
//! [`crate::git::ResolutionFailure`] instead and never abort a run.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised by depsync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The dependency manifest does not exist at the given path.
    #[error("manifest file not found: {}", path.display())]
    ManifestNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The flake file does not exist at the given path.
    #[error("flake file not found: {}", path.display())]
    FlakeNotFound {
        /// Path that was checked.
        path: PathBuf,
    },

    /// The manifest could not be parsed as EDN.
    #[error("failed to parse {file}: {reason}")]
    ManifestParse {
        /// Manifest path, for display.
        file: String,
        /// Parser diagnostic, including the line number.
        reason: String,
    },

    /// The manifest parsed, but its shape is not usable (for example the
    /// top level is not a map).
    #[error("unexpected manifest structure: {reason}")]
    ManifestShape {
        /// What was found instead of the expected structure.
        reason: String,
    },

    /// A change set entry points at a manifest location that no longer
    /// exists. Indicates the manifest changed between scan and rewrite.
    #[error("manifest entry not found at {path}")]
    EntryNotFound {
        /// The location path, joined for display.
        path: String,
    },

    /// Writing a rewritten file failed. The run must not report success
    /// once this has been raised.
    #[error("failed to write {file}")]
    WriteFailure {
        /// Destination path, for display.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A lock-regeneration subprocess exited nonzero. The already
    /// rewritten files are left in place.
    #[error("{command} exited with {status}")]
    Collaborator {
        /// The command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured stderr, attached for the report.
        stderr: String,
    },
}
