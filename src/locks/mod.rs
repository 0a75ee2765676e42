//! Lock regeneration collaborators.
//!
//! After the manifest and flake are rewritten, their lock files are
//! stale: `flake.lock` still pins the old input revisions and
//! `deps-lock.json` still describes the old dependency tree. When asked
//! to (`--update-locks`), depsync invokes the external tools that own
//! those files and surfaces their exit status without interpreting it
//! further.
//!
//! A nonzero exit here never rolls back the file rewrites. The files are
//! the source of truth and regenerating locks can simply be retried.

use std::path::Path;

use tokio::process::Command;

use crate::core::SyncError;

/// The collaborator invocations, in order: refresh `flake.lock`, then
/// regenerate `deps-lock.json` through the flake's clj-nix app.
const LOCK_COMMANDS: &[&[&str]] = &[
    &["nix", "flake", "lock"],
    &["nix", "run", ".#deps-lock"],
];

/// Result of one collaborator invocation.
#[derive(Debug)]
pub struct LockRun {
    /// The command line that was run.
    pub command: String,
    /// Whether it exited zero.
    pub success: bool,
    /// The failure to report when it did not.
    pub failure: Option<SyncError>,
}

/// Run the lock-regeneration tools in `project_dir`.
///
/// Both tools are attempted even if the first fails; every failure,
/// including a tool that could not be spawned, is captured in the
/// returned runs for reporting.
pub async fn regenerate(project_dir: &Path) -> Vec<LockRun> {
    let mut runs = Vec::with_capacity(LOCK_COMMANDS.len());

    for argv in LOCK_COMMANDS {
        let command_line = argv.join(" ");
        tracing::debug!(command = command_line.as_str(), "running lock regeneration");

        let output = Command::new(argv[0])
            .args(&argv[1..])
            .current_dir(project_dir)
            .output()
            .await;

        let run = match output {
            Ok(output) if output.status.success() => {
                LockRun { command: command_line, success: true, failure: None }
            }
            Ok(output) => {
                let status = output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |code| format!("status {code}"));
                let failure = SyncError::Collaborator {
                    command: command_line.clone(),
                    status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                };
                LockRun { command: command_line, success: false, failure: Some(failure) }
            }
            Err(e) => {
                let failure = SyncError::Collaborator {
                    command: command_line.clone(),
                    status: "spawn failure".to_string(),
                    stderr: e.to_string(),
                };
                LockRun { command: command_line, success: false, failure: Some(failure) }
            }
        };
        runs.push(run);
    }

    runs
}
