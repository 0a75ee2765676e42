//! Git URL normalization and remote revision resolution.
//!
//! Two concerns live here:
//!
//! - [`RepoRef`] turns the many ways a repository can be written (web
//!   URL, SSH, scp-like, `github:` shorthand, `git+` prefixed, plain
//!   local path) into one comparable owner/repo form. Matching between
//!   manifest entries and flake inputs, and the `--override` key space,
//!   both run on this normalized form.
//! - [`resolve_head`] asks a remote for its current default-branch
//!   revision with `git ls-remote <url> HEAD`, like Cargo shelling out to
//!   the system git rather than reimplementing the transport. A single
//!   attempt is made per repository; failures are classified into
//!   [`ResolutionFailure`] and reported per entry without aborting the
//!   run.
//!
//! `GIT_TERMINAL_PROMPT=0` is set on every invocation so a remote that
//! wants credentials fails immediately instead of hanging an unattended
//! run.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::process::Command;

/// Upper bound for a single remote query.
pub const LS_REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Hosts with a flake shorthand form (`github:owner/repo`).
const HOSTED: &[(&str, &str)] = &[("github.com", "github"), ("gitlab.com", "gitlab")];

/// Normalized form of a repository URL.
///
/// Equality deliberately compares `owner` and `repo` only, case
/// sensitively. `host` and `hosted` are carried for fetch-URL and
/// shorthand construction but two references to the same owner/repo pair
/// written against different forms still compare equal.
#[derive(Debug, Clone, Eq)]
pub struct RepoRef {
    /// Host name, empty for local paths.
    pub host: String,
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name, `.git` suffix stripped.
    pub repo: String,
    /// Whether the host has a flake shorthand form.
    pub hosted: bool,
}

impl PartialEq for RepoRef {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.repo == other.repo
    }
}

impl std::hash::Hash for RepoRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.repo.hash(state);
    }
}

impl RepoRef {
    /// Normalize a repository URL.
    ///
    /// Accepted forms:
    ///
    /// - `https://github.com/acme/lib-a` (also `http`, trailing `.git`,
    ///   extra path segments and query ignored)
    /// - `git@github.com:acme/lib-a.git`
    /// - `ssh://git@github.com/acme/lib-a`
    /// - `github:acme/lib-a` / `gitlab:acme/lib-a`, with an optional
    ///   `/ref` segment
    /// - `git+https://...` (prefix and query stripped before parsing)
    /// - `file:///path/to/repo` and plain local paths, normalized from
    ///   their last two path segments with `hosted == false`
    ///
    /// Returns `None` when no owner/repo pair can be derived.
    pub fn parse(url: &str) -> Option<Self> {
        let url = url.trim();
        let url = url.strip_prefix("git+").unwrap_or(url);
        // query and fragment never contribute to identity
        let url = url.split(['?', '#']).next().unwrap_or(url);

        for (host, service) in HOSTED {
            if let Some(rest) = url.strip_prefix(&format!("{service}:")) {
                let mut segments = rest.split('/');
                let owner = segments.next()?;
                let repo = segments.next()?;
                return Self::build(host, owner, repo);
            }
        }

        if let Some(rest) = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))
        {
            let mut segments = rest.split('/');
            let host = segments.next()?;
            let owner = segments.next()?;
            let repo = segments.next()?;
            return Self::build(host, owner, repo);
        }

        if let Some(rest) = url.strip_prefix("ssh://") {
            let rest = rest.split_once('@').map_or(rest, |(_, r)| r);
            let mut segments = rest.split('/');
            let host = segments.next()?;
            let owner = segments.next()?;
            let repo = segments.next()?;
            return Self::build(host, owner, repo);
        }

        // scp-like form: git@host:owner/repo
        if let Some((user_host, path)) = url.split_once(':') {
            if user_host.contains('@') && !path.starts_with("//") {
                let host = user_host.split_once('@').map_or(user_host, |(_, h)| h);
                let mut segments = path.split('/');
                let owner = segments.next()?;
                let repo = segments.next()?;
                return Self::build(host, owner, repo);
            }
        }

        // local repository: file:// URL or plain path
        let path = url.strip_prefix("file://").unwrap_or(url);
        if is_local_path(path) || url.starts_with("file://") {
            let mut segments = path.trim_end_matches('/').rsplit('/').filter(|s| !s.is_empty());
            let repo = segments.next()?;
            let owner = segments.next()?;
            return Self::build("", owner, repo);
        }

        None
    }

    fn build(host: &str, owner: &str, repo: &str) -> Option<Self> {
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            hosted: HOSTED.iter().any(|(h, _)| *h == host),
        })
    }

    /// The `owner/repo` key used by `--override`.
    pub fn override_key(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Flake shorthand service name for this host, when there is one.
    pub fn shorthand_service(&self) -> Option<&'static str> {
        HOSTED.iter().find(|(h, _)| *h == self.host).map(|(_, s)| *s)
    }
}

/// Whether a dependency URL is a filesystem path rather than a remote URL.
///
/// Plain paths still point at clonable repositories (`git ls-remote`
/// accepts them), they just never participate in hosted-URL matching.
pub fn is_local_path(url: &str) -> bool {
    if url.starts_with('/') || url.starts_with("./") || url.starts_with("../") {
        return true;
    }
    // Windows drive letter
    let mut chars = url.chars();
    matches!((chars.next(), chars.next()), (Some(c), Some(':')) if c.is_ascii_alphabetic())
}

/// Derive the URL handed to `git ls-remote` from a declared URL.
///
/// Shorthand forms, which git cannot fetch directly, become a full
/// `https://` clone URL. For everything else only the `git+` prefix and
/// any query parameters are stripped; in particular SSH URLs stay SSH so
/// that remotes relying on key authentication keep working.
pub fn fetch_url(url: &str) -> String {
    for (host, service) in HOSTED {
        if url.strip_prefix(&format!("{service}:")).is_some() {
            if let Some(reference) = RepoRef::parse(url) {
                return format!("https://{host}/{}/{}.git", reference.owner, reference.repo);
            }
        }
    }
    let url = url.strip_prefix("git+").unwrap_or(url);
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

/// Why resolving one repository's revision failed.
///
/// Resolution failures are per entry and never fatal. The engine logs
/// the failure, skips the entry and continues with the rest of the run.
#[derive(Error, Debug)]
pub enum ResolutionFailure {
    /// Remote unreachable, authentication refused, or the query timed out.
    #[error("network failure: {0}")]
    Network(String),

    /// The remote reports that the repository does not exist.
    #[error("repository not found: {0}")]
    NotFound(String),

    /// `ls-remote` succeeded but printed nothing usable.
    #[error("malformed ls-remote output: {0}")]
    MalformedOutput(String),
}

/// Builder for git subprocess invocations.
///
/// Thin wrapper over [`tokio::process::Command`] that applies the
/// non-interactive environment and the query timeout in one place.
#[derive(Debug, Default)]
pub struct GitCommand {
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl GitCommand {
    /// Start an empty git invocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run in the given directory instead of the process working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Abort the invocation after the given duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute and collect output.
    pub async fn output(self) -> Result<std::process::Output> {
        let mut command = Command::new("git");
        command
            .args(&self.args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let invocation = format!("git {}", self.args.join(" "));
        let running = command.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, running)
                .await
                .with_context(|| format!("{invocation} timed out after {limit:?}"))?,
            None => running.await,
        };
        output.with_context(|| format!("failed to run {invocation}"))
    }
}

/// Resolve the current default-branch revision of a repository.
///
/// Equivalent to `git ls-remote <url> HEAD`, returning the full object
/// id of the remote HEAD. One attempt, bounded by [`LS_REMOTE_TIMEOUT`].
pub async fn resolve_head(url: &str) -> Result<String, ResolutionFailure> {
    let fetchable = fetch_url(url);
    tracing::debug!(url, fetchable = fetchable.as_str(), "querying remote HEAD");

    let output = GitCommand::new()
        .args(["ls-remote", &fetchable, "HEAD"])
        .timeout(LS_REMOTE_TIMEOUT)
        .output()
        .await
        .map_err(|e| ResolutionFailure::Network(format!("{e:#}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let lowered = stderr.to_lowercase();
        let missing = lowered.contains("not found")
            || lowered.contains("does not exist")
            || lowered.contains("does not appear to be a git repository");
        return Err(if missing {
            ResolutionFailure::NotFound(stderr.to_string())
        } else {
            ResolutionFailure::Network(stderr.to_string())
        });
    }

    parse_head_output(&String::from_utf8_lossy(&output.stdout))
}

/// Extract the HEAD object id from `ls-remote` output.
fn parse_head_output(stdout: &str) -> Result<String, ResolutionFailure> {
    let first = stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .ok_or_else(|| ResolutionFailure::MalformedOutput("empty output".to_string()))?;

    let is_object_id = matches!(first.len(), 40 | 64)
        && first.chars().all(|c| c.is_ascii_hexdigit());
    if !is_object_id {
        return Err(ResolutionFailure::MalformedOutput(format!(
            "expected an object id, got {first:?}"
        )));
    }
    Ok(first.to_string())
}
