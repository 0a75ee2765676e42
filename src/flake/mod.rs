//! Flake input scanning, matching and line-oriented rewriting.
//!
//! The flake file is treated as text, not as a parsed Nix expression.
//! Scanning records which line declares each input's URL; rewriting
//! replaces only the quoted URL substring on exactly those lines and
//! leaves every other byte of the file alone, comments and formatting
//! included. Nix does not guarantee a stable structural round trip, so
//! textual patching is what keeps unrelated formatting out of diffs.
//!
//! Both common input layouts are recognized:
//!
//! ```nix
//! inputs.lib-a.url = "github:acme/lib-a";      # flat form
//!
//! inputs = {
//!   lib-b.url = "github:acme/lib-b";           # qualified form
//!   lib-c = {
//!     url = "git+https://example.org/lib-c";   # block form
//!     flake = false;
//!   };
//! };
//! ```
//!
//! [`match_input`] correlates a manifest dependency with an input in two
//! tiers: normalized-URL equality first, then name heuristics. When a
//! tier yields several candidates the first declared wins and the others
//! are logged, because an ambiguous match points at a problem in the
//! dependency graph rather than something to resolve silently.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::core::SyncError;
use crate::git::RepoRef;
use crate::manifest::DependencyEntry;

static FLAT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*inputs\.([A-Za-z0-9_][A-Za-z0-9_'-]*)\.url\s*=\s*"([^"]*)""#)
        .expect("valid regex")
});
static QUALIFIED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([A-Za-z0-9_][A-Za-z0-9_'-]*)\.url\s*=\s*"([^"]*)""#)
        .expect("valid regex")
});
static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*([A-Za-z0-9_][A-Za-z0-9_'-]*)\s*=\s*\{"#).expect("valid regex")
});
static NESTED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*url\s*=\s*"([^"]*)""#).expect("valid regex")
});
static INPUTS_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:^|\s)inputs\s*=\s*\{"#).expect("valid regex"));
static URL_ANYWHERE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|[\s{])(?:([A-Za-z0-9_][A-Za-z0-9_'-]*)\.)?url\s*=\s*"([^"]*)""#)
        .expect("valid regex")
});

/// One external-source declaration found in the flake file.
#[derive(Debug, Clone, PartialEq)]
pub struct FlakeInput {
    /// Input name, unique within the file (first declaration wins).
    pub name: String,
    /// Declared URL.
    pub url: String,
    /// Zero-based line of the URL declaration.
    pub line: usize,
}

/// A flake file held as lines, plus the inputs found in it.
#[derive(Debug, Clone)]
pub struct FlakeFile {
    path: PathBuf,
    lines: Vec<String>,
    trailing_newline: bool,
    inputs: Vec<FlakeInput>,
}

impl FlakeFile {
    /// Load a flake file and scan it for inputs.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::FlakeNotFound { path: path.to_path_buf() }.into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read flake file {}", path.display()))?;
        Ok(Self::from_str(&content, path))
    }

    /// Build from in-memory content. `path` is recorded for saving.
    pub fn from_str(content: &str, path: &Path) -> Self {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let inputs = scan_inputs(&lines);
        Self {
            path: path.to_path_buf(),
            lines,
            trailing_newline: content.ends_with('\n'),
            inputs,
        }
    }

    /// The inputs found at load time, in declaration order.
    pub fn inputs(&self) -> &[FlakeInput] {
        &self.inputs
    }

    /// Current text of the file.
    pub fn text(&self) -> String {
        let mut out = self.lines.join("\n");
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    /// Replace the quoted `old_url` with `new_url` on the given line.
    ///
    /// Only that one line is touched. Fails if the line does not carry
    /// the expected URL, which means the file changed since scanning.
    pub fn rewrite_url(&mut self, line: usize, old_url: &str, new_url: &str) -> Result<()> {
        let text = self.lines.get_mut(line).ok_or_else(|| {
            anyhow::anyhow!("line {} is out of range for {}", line + 1, self.path.display())
        })?;
        let quoted_old = format!("\"{old_url}\"");
        if !text.contains(&quoted_old) {
            anyhow::bail!(
                "line {} of {} no longer declares \"{}\"",
                line + 1,
                self.path.display(),
                old_url
            );
        }
        *text = text.replacen(&quoted_old, &format!("\"{new_url}\""), 1);
        if let Some(input) = self.inputs.iter_mut().find(|i| i.line == line) {
            input.url = new_url.to_string();
        }
        Ok(())
    }

    /// Write the current text back to disk in a single write.
    pub fn save(&self) -> Result<()> {
        std::fs::write(&self.path, self.text()).map_err(|e| SyncError::WriteFailure {
            file: self.path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

/// Line scan for input URL declarations.
fn scan_inputs(lines: &[String]) -> Vec<FlakeInput> {
    let mut inputs: Vec<FlakeInput> = Vec::new();
    let mut in_inputs = false;
    let mut depth = 0i32;
    let mut current: Option<String> = None;

    fn push(inputs: &mut Vec<FlakeInput>, name: &str, url: &str, line: usize) {
        inputs.push(FlakeInput { name: name.to_string(), url: url.to_string(), line });
    }

    for (line_no, line) in lines.iter().enumerate() {
        if !in_inputs {
            if let Some(caps) = FLAT_URL.captures(line) {
                push(&mut inputs, &caps[1], &caps[2], line_no);
            } else if let Some(m) = INPUTS_OPEN.find(line) {
                in_inputs = true;
                current = None;
                depth = brace_delta(&line[m.start()..]);
                // a one-line inputs attrset closes again immediately
                if let Some(caps) = URL_ANYWHERE.captures(&line[m.end()..]) {
                    if let Some(name) = caps.get(1) {
                        push(&mut inputs, name.as_str(), &caps[2], line_no);
                    }
                }
                if depth <= 0 {
                    in_inputs = false;
                }
            }
            continue;
        }

        if depth == 1 {
            if let Some(caps) = QUALIFIED_URL.captures(line) {
                push(&mut inputs, &caps[1], &caps[2], line_no);
            } else if let Some(caps) = BLOCK_HEADER.captures(line) {
                let name = caps[1].to_string();
                let rest = &line[caps.get(0).map_or(0, |m| m.end())..];
                if let Some(url) = URL_ANYWHERE.captures(rest) {
                    // single-line block: name = { url = "..."; ... };
                    push(&mut inputs, &name, &url[2], line_no);
                } else {
                    current = Some(name);
                }
            }
        } else if depth == 2 {
            if let Some(caps) = NESTED_URL.captures(line) {
                if let Some(name) = current.clone() {
                    push(&mut inputs, &name, &caps[1], line_no);
                }
            }
        }

        depth += brace_delta(line);
        if depth <= 0 {
            in_inputs = false;
            current = None;
        } else if depth == 1 {
            current = None;
        }
    }

    inputs
}

/// Net brace count of a line, ignoring string contents and comments.
fn brace_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => delta += 1,
            '}' => delta -= 1,
            '#' => break,
            _ => {}
        }
    }
    delta
}

/// Correlate a manifest dependency with a flake input.
///
/// Tier one compares normalized repository references; an input whose URL
/// is not a hosted form cannot match here. Tier two derives candidate
/// names from the coordinate: the segment after the last `/`, the
/// coordinate with `.` replaced by `-`, and the literal coordinate.
/// The first tier producing any candidate decides; within a tier the
/// first declared input wins and further candidates are logged.
pub fn match_input<'a>(
    entry: &DependencyEntry,
    inputs: &'a [FlakeInput],
) -> Option<&'a FlakeInput> {
    if let Some(entry_ref) = RepoRef::parse(&entry.url).filter(|r| r.hosted) {
        let mut hits = inputs.iter().filter(|input| {
            RepoRef::parse(&input.url).is_some_and(|r| r.hosted && r == entry_ref)
        });
        if let Some(first) = hits.next() {
            for extra in hits {
                tracing::warn!(
                    dependency = entry.name.as_str(),
                    matched = first.name.as_str(),
                    also = extra.name.as_str(),
                    "ambiguous flake input match by URL, keeping the first declared"
                );
            }
            return Some(first);
        }
    }

    let candidates = derived_names(&entry.name);
    let mut hits =
        inputs.iter().filter(|input| candidates.iter().any(|name| *name == input.name));
    if let Some(first) = hits.next() {
        for extra in hits {
            tracing::warn!(
                dependency = entry.name.as_str(),
                matched = first.name.as_str(),
                also = extra.name.as_str(),
                "ambiguous flake input match by name, keeping the first declared"
            );
        }
        return Some(first);
    }
    None
}

/// Candidate input names derived from a dependency coordinate.
fn derived_names(coordinate: &str) -> Vec<String> {
    let mut names = Vec::with_capacity(3);
    if let Some(short) = coordinate.rsplit('/').next() {
        names.push(short.to_string());
    }
    names.push(coordinate.replace('.', "-"));
    names.push(coordinate.to_string());
    names
}

/// Build the pinned URL for a matched input.
///
/// Hosted references become the shorthand pinned form
/// (`github:owner/repo/revision`). Anything else keeps its URL and gets
/// a `rev` query parameter replaced or appended.
pub fn pinned_url(declared: &str, rev: &str) -> String {
    if let Some(reference) = RepoRef::parse(declared) {
        if let Some(service) = reference.shorthand_service() {
            return format!("{service}:{}/{}/{rev}", reference.owner, reference.repo);
        }
    }

    let (base, fragment) = match declared.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (declared, None),
    };
    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (base, None),
    };
    let mut params: Vec<String> = query
        .map(|q| {
            q.split('&')
                .filter(|p| !p.is_empty() && !p.starts_with("rev="))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    params.push(format!("rev={rev}"));

    let mut out = format!("{path}?{}", params.join("&"));
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}
