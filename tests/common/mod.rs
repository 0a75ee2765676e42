//! Shared fixtures for depsync integration tests.
//!
//! [`TestProject`] builds a temp directory holding a `deps.edn`, a
//! `flake.nix` and any number of local git repositories. Local
//! repository paths work as `:git/url` values (`git ls-remote` accepts
//! them), so revision resolution is exercised end to end without any
//! network access.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// A temp project directory with manifest, flake and source repos.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        Self { dir: TempDir::new().expect("failed to create temp dir") }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn deps_file(&self) -> PathBuf {
        self.dir.path().join("deps.edn")
    }

    pub fn flake_file(&self) -> PathBuf {
        self.dir.path().join("flake.nix")
    }

    pub fn write_manifest(&self, content: &str) {
        std::fs::write(self.deps_file(), content).expect("failed to write deps.edn");
    }

    pub fn write_flake(&self, content: &str) {
        std::fs::write(self.flake_file(), content).expect("failed to write flake.nix");
    }

    pub fn read_manifest(&self) -> String {
        std::fs::read_to_string(self.deps_file()).expect("failed to read deps.edn")
    }

    pub fn read_flake(&self) -> String {
        std::fs::read_to_string(self.flake_file()).expect("failed to read flake.nix")
    }

    /// Create a local git repository under `sources/<name>` with one
    /// commit. Returns its path and HEAD revision.
    pub fn create_source_repo(&self, name: &str) -> (PathBuf, String) {
        let repo = self.dir.path().join("sources").join(name);
        std::fs::create_dir_all(&repo).expect("failed to create repo dir");
        git(&repo, &["init", "-q"]);
        let head = self.commit(&repo, "initial commit");
        (repo, head)
    }

    /// Add an empty commit, moving the repository's HEAD. Returns the
    /// new HEAD revision.
    pub fn commit(&self, repo: &Path, message: &str) -> String {
        git(
            repo,
            &[
                "-c",
                "user.name=depsync-tests",
                "-c",
                "user.email=depsync@invalid",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "--allow-empty",
                "-m",
                message,
            ],
        );
        git_stdout(repo, &["rev-parse", "HEAD"])
    }
}

fn git(repo: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed in {}", repo.display());
}

fn git_stdout(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {args:?} failed in {}", repo.display());
    String::from_utf8(output.stdout).expect("git output was not utf-8").trim().to_string()
}
