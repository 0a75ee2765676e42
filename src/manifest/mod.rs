//! Manifest (deps.edn) loading, scanning and rewriting.
//!
//! The manifest is held as a parsed EDN document with insertion order
//! preserved. [`Manifest::scan`] walks it for Git dependencies and
//! records where each one lives; [`Manifest::set_revision`] writes a new
//! pin back to exactly that location. Saving re-serializes the whole
//! document in memory and performs a single write, so an interrupted run
//! leaves the file either fully rewritten or untouched.
//!
//! # Where dependencies are found
//!
//! Git dependencies live under the root `:deps` map and under each
//! alias's `:extra-deps` and `:replace-deps` maps:
//!
//! ```clojure
//! {:deps {io.github.acme/lib-a {:git/url "https://github.com/acme/lib-a"
//!                               :git/sha "aaa111..."}}
//!  :aliases {:dev {:extra-deps {acme/devtool {:git/url "..." :sha "..."}}}}}
//! ```
//!
//! A map value carrying both `:git/url` and a pin key (`:git/sha`, or
//! the legacy `:sha`) is a dependency entry. A map value without both is
//! descended into; scalars are ignored. The scan is a pure read: it
//! returns entries in discovery order (root `:deps` first, then aliases
//! in declaration order) and accumulates the location path as an explicit
//! parameter instead of mutating shared state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::SyncError;
use crate::edn::{self, Edn};

/// Key carrying the repository URL of a Git dependency.
const URL_KEY: &str = ":git/url";

/// Pin keys, in lookup order. The rewrite goes to whichever key the pin
/// was found under.
const PIN_KEYS: &[&str] = &[":git/sha", ":sha"];

/// Alias sub-keys that hold dependency collections.
const ALIAS_DEP_KEYS: &[&str] = &[":extra-deps", ":replace-deps"];

/// One Git dependency found in the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEntry {
    /// Coordinate symbol, e.g. `io.github.acme/lib-a`.
    pub name: String,
    /// Declared `:git/url` value.
    pub url: String,
    /// Currently pinned revision.
    pub rev: String,
    /// The key the pin was found under (`:git/sha` or `:sha`).
    pub rev_key: String,
    /// Key path from the document root to this entry, e.g.
    /// `[":aliases", ":dev", ":extra-deps", "io.github.acme/lib-a"]`.
    pub path: Vec<String>,
}

/// A parsed `deps.edn` document.
#[derive(Debug, Clone)]
pub struct Manifest {
    doc: Edn,
    path: PathBuf,
}

impl Manifest {
    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::ManifestNotFound { path: path.to_path_buf() }.into());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest file {}", path.display()))?;
        Self::from_str(&content, path)
    }

    /// Parse manifest content. `path` is recorded for [`Manifest::save`]
    /// and error messages.
    pub fn from_str(content: &str, path: &Path) -> Result<Self> {
        let doc = Edn::parse(content).map_err(|e| SyncError::ManifestParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if doc.as_map().is_none() {
            return Err(SyncError::ManifestShape {
                reason: "top-level form is not a map".to_string(),
            }
            .into());
        }
        Ok(Self { doc, path: path.to_path_buf() })
    }

    /// Path this manifest was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find every Git dependency, in discovery order.
    pub fn scan(&self) -> Vec<DependencyEntry> {
        let mut entries = Vec::new();

        if let Some(deps) = self.doc.get(":deps") {
            scan_collection(deps, &[":deps".to_string()], &mut entries);
        }

        if let Some(Edn::Map(aliases)) = self.doc.get(":aliases") {
            for (alias_key, alias_value) in aliases {
                let Some(alias_name) = edn::key_text(alias_key) else { continue };
                for dep_key in ALIAS_DEP_KEYS {
                    if let Some(deps) = alias_value.get(dep_key) {
                        let prefix = vec![
                            ":aliases".to_string(),
                            alias_name.to_string(),
                            (*dep_key).to_string(),
                        ];
                        scan_collection(deps, &prefix, &mut entries);
                    }
                }
            }
        }

        tracing::debug!(count = entries.len(), "scanned manifest for git dependencies");
        entries
    }

    /// Set the pinned revision of the entry at `path`, under `rev_key`.
    ///
    /// Fails if the location no longer exists, which means the manifest
    /// changed between scan and rewrite.
    pub fn set_revision(&mut self, path: &[String], rev_key: &str, rev: &str) -> Result<()> {
        let entry = self.doc.get_path_mut(path).ok_or_else(|| SyncError::EntryNotFound {
            path: path.join(" "),
        })?;
        let pin = entry.get_mut(rev_key).ok_or_else(|| SyncError::EntryNotFound {
            path: format!("{} {rev_key}", path.join(" ")),
        })?;
        *pin = Edn::String(rev.to_string());
        Ok(())
    }

    /// Serialize the document back to EDN text.
    pub fn to_edn_string(&self) -> String {
        let mut out = self.doc.to_edn_string();
        out.push('\n');
        out
    }

    /// Write the document back to the file it was loaded from.
    ///
    /// The content is fully serialized before the write starts.
    pub fn save(&self) -> Result<()> {
        let content = self.to_edn_string();
        std::fs::write(&self.path, content).map_err(|e| SyncError::WriteFailure {
            file: self.path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

/// Recursive walk of one dependency collection.
///
/// `prefix` is the key path to `value` from the document root; entries
/// are appended in encounter order.
fn scan_collection(value: &Edn, prefix: &[String], entries: &mut Vec<DependencyEntry>) {
    let Some(pairs) = value.as_map() else { return };
    for (key, candidate) in pairs {
        let Some(name) = edn::key_text(key) else { continue };
        let Some(dep_map) = candidate.as_map() else { continue };

        let url = candidate.get(URL_KEY).and_then(Edn::as_str);
        let pin = PIN_KEYS.iter().find_map(|k| {
            candidate.get(k).and_then(Edn::as_str).map(|rev| (*k, rev))
        });

        let mut path: Vec<String> = prefix.to_vec();
        path.push(name.to_string());

        match (url, pin) {
            (Some(url), Some((rev_key, rev))) => entries.push(DependencyEntry {
                name: name.to_string(),
                url: url.to_string(),
                rev: rev.to_string(),
                rev_key: rev_key.to_string(),
                path,
            }),
            _ => {
                // not a git entry; a nested map may still contain some
                if !dep_map.is_empty() {
                    scan_collection(candidate, &path, entries);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{:paths ["src"]
 :deps {io.github.acme/lib-a {:git/url "https://github.com/acme/lib-a"
                              :git/sha "aaa111aaa111aaa111aaa111aaa111aaa111aaa1"}
        org.clojure/clojure {:mvn/version "1.11.1"}
        acme/legacy {:git/url "https://github.com/acme/legacy" :sha "bbb222"}}
 :aliases {:dev {:extra-deps {acme/devtool {:git/url "https://github.com/acme/devtool"
                                            :git/sha "ccc333"}}}
           :test {:replace-deps {acme/runner {:git/url "https://github.com/acme/runner"
                                              :git/sha "ddd444"}}
                  :main-opts ["-m" "runner"]}}}"#;

    fn manifest() -> Manifest {
        Manifest::from_str(SAMPLE, Path::new("deps.edn")).unwrap()
    }

    #[test]
    fn scan_finds_git_entries_in_discovery_order() {
        let entries = manifest().scan();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["io.github.acme/lib-a", "acme/legacy", "acme/devtool", "acme/runner"]
        );
    }

    #[test]
    fn scan_skips_non_git_entries() {
        let entries = manifest().scan();
        assert!(entries.iter().all(|e| e.name != "org.clojure/clojure"));
    }

    #[test]
    fn scan_records_location_paths() {
        let entries = manifest().scan();
        let devtool = entries.iter().find(|e| e.name == "acme/devtool").unwrap();
        assert_eq!(
            devtool.path,
            vec![":aliases", ":dev", ":extra-deps", "acme/devtool"]
        );
        let lib_a = entries.iter().find(|e| e.name == "io.github.acme/lib-a").unwrap();
        assert_eq!(lib_a.path, vec![":deps", "io.github.acme/lib-a"]);
    }

    #[test]
    fn scan_records_legacy_pin_key() {
        let entries = manifest().scan();
        let legacy = entries.iter().find(|e| e.name == "acme/legacy").unwrap();
        assert_eq!(legacy.rev_key, ":sha");
        assert_eq!(legacy.rev, "bbb222");
    }

    #[test]
    fn set_revision_updates_exact_location() {
        let mut m = manifest();
        let entries = m.scan();
        let devtool = entries.iter().find(|e| e.name == "acme/devtool").unwrap().clone();
        m.set_revision(&devtool.path, &devtool.rev_key, "eee555").unwrap();

        let rescanned = m.scan();
        let updated = rescanned.iter().find(|e| e.name == "acme/devtool").unwrap();
        assert_eq!(updated.rev, "eee555");
        assert_eq!(updated.path, devtool.path);

        // the other entries are untouched
        let lib_a = rescanned.iter().find(|e| e.name == "io.github.acme/lib-a").unwrap();
        assert_eq!(lib_a.rev, "aaa111aaa111aaa111aaa111aaa111aaa111aaa1");
    }

    #[test]
    fn set_revision_honors_legacy_pin_key() {
        let mut m = manifest();
        let entries = m.scan();
        let legacy = entries.iter().find(|e| e.name == "acme/legacy").unwrap().clone();
        m.set_revision(&legacy.path, &legacy.rev_key, "fff666").unwrap();

        let content = m.to_edn_string();
        assert!(content.contains(":sha \"fff666\""), "{content}");
        assert!(!content.contains(":git/sha \"fff666\""), "{content}");
    }

    #[test]
    fn set_revision_fails_on_missing_location() {
        let mut m = manifest();
        let missing = vec![":deps".to_string(), "acme/gone".to_string()];
        assert!(m.set_revision(&missing, ":git/sha", "abc").is_err());
    }

    #[test]
    fn rewrite_round_trips_through_scan() {
        let mut m = manifest();
        for entry in m.scan() {
            m.set_revision(&entry.path, &entry.rev_key, "0123456789").unwrap();
        }
        let rewritten =
            Manifest::from_str(&m.to_edn_string(), Path::new("deps.edn")).unwrap();
        let entries = rewritten.scan();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().all(|e| e.rev == "0123456789"));
    }

    #[test]
    fn rejects_non_map_manifest() {
        assert!(Manifest::from_str("[:not :a :map]", Path::new("deps.edn")).is_err());
    }

    #[test]
    fn rejects_invalid_edn() {
        let err = Manifest::from_str("{:deps", Path::new("deps.edn")).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
