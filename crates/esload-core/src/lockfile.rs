//! `deno.lock` reader.
//!
//! Parsing and the version 3 → 4 migration are done by `deno_lockfile`;
//! this module flattens its content into the lookups the loader needs:
//!
//! ```json
//! {
//!   "version": "4",
//!   "specifiers": { "jsr:@std/path@^1.0.0": "1.0.6", "npm:preact@10": "10.19.2" },
//!   "jsr": { "@std/path@1.0.6": { "integrity": "..." } },
//!   "npm": { "preact@10.19.2": { "integrity": "...", "dependencies": [] } },
//!   "remote": {}
//! }
//! ```

use crate::error::{codes, LoaderError, Result};
use deno_lockfile::NewLockfileOptions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lockfile versions this reader understands.
pub const SUPPORTED_VERSIONS: [&str; 2] = ["3", "4"];

/// A locked package entry (JSR or npm).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedPackage {
    /// For npm: dependency package ids (`name@version`). For JSR: the
    /// dependency specifiers.
    pub dependencies: Vec<String>,
}

/// A parsed lockfile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    pub path: PathBuf,
    /// Version declared by the file on disk.
    pub version: String,
    /// Specifier (`jsr:@std/path@^1.0.0`) → locked value. The value is a
    /// version (`1.0.6`) or, for aliases and version 3 files, a full
    /// specifier (`npm:other@1.0.0`).
    pub specifiers: BTreeMap<String, String>,
    /// `name@version` → entry.
    pub jsr: BTreeMap<String, LockedPackage>,
    /// Package id (`name@version[_peers]`) → entry.
    pub npm: BTreeMap<String, LockedPackage>,
    /// Remote URL → integrity hash.
    pub remote: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct Header {
    version: String,
}

impl Lockfile {
    /// Read and parse a lockfile.
    ///
    /// # Errors
    /// Returns `LOCKFILE_MISSING` if the file does not exist and
    /// `LOCKFILE_INVALID` if it cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LoaderError::new(
                    codes::LOCKFILE_MISSING,
                    format!("Lockfile not found: {}", path.display()),
                )
            } else {
                LoaderError::new(
                    codes::LOCKFILE_INVALID,
                    format!("Failed to read lockfile {}: {e}", path.display()),
                )
            }
        })?;

        let lockfile = Self::parse(&content, path)?;
        debug!(
            path = %path.display(),
            version = %lockfile.version,
            specifiers = lockfile.specifiers.len(),
            "loaded lockfile"
        );
        Ok(lockfile)
    }

    /// Parse lockfile JSON. `path` is recorded for error messages.
    ///
    /// # Errors
    /// Returns `LOCKFILE_INVALID` on malformed JSON or an unsupported version.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let invalid = |msg: String| {
            LoaderError::new(
                codes::LOCKFILE_INVALID,
                format!("Invalid lockfile {}: {msg}", path.display()),
            )
        };

        let header: Header = serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;
        if !SUPPORTED_VERSIONS.contains(&header.version.as_str()) {
            return Err(invalid(format!(
                "version {} not supported (expected one of {})",
                header.version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        let parsed = deno_lockfile::Lockfile::new(NewLockfileOptions {
            file_path: path.to_path_buf(),
            content,
            overwrite: false,
        })
        .map_err(|e| invalid(e.to_string()))?;
        let packages = &parsed.content.packages;

        let specifiers = packages
            .specifiers
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let npm = packages
            .npm
            .iter()
            .map(|(id, info)| {
                let dependencies = info
                    .dependencies
                    .values()
                    .map(|dep| {
                        let dep = dep.to_string();
                        dep.strip_prefix("npm:").map_or_else(|| dep.clone(), String::from)
                    })
                    .collect();
                (id.to_string(), LockedPackage { dependencies })
            })
            .collect();

        let jsr = packages
            .jsr
            .iter()
            .map(|(key, info)| {
                let dependencies = info.dependencies.iter().map(ToString::to_string).collect();
                (key.to_string(), LockedPackage { dependencies })
            })
            .collect();

        let remote = parsed
            .remote()
            .iter()
            .map(|(url, hash)| (url.to_string(), hash.to_string()))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            version: header.version,
            specifiers,
            jsr,
            npm,
            remote,
        })
    }

    /// Locked value for `{scheme}:{name}[@{req}]`. A missing requirement and
    /// `*` are the same key.
    fn locked(&self, scheme: &str, name: &str, req: Option<&str>) -> Option<&str> {
        let bare = format!("{scheme}:{name}");
        let candidates = match req {
            Some("*") | None => vec![format!("{bare}@*"), bare],
            Some(req) => vec![format!("{bare}@{req}")],
        };
        candidates
            .iter()
            .find_map(|key| self.specifiers.get(key))
            .map(String::as_str)
    }

    /// Exact version locked for `jsr:{name}[@{req}]`.
    #[must_use]
    pub fn jsr_version(&self, name: &str, req: Option<&str>) -> Option<&str> {
        self.locked("jsr", name, req).map(locked_version)
    }

    /// npm package id locked for the `npm:{name}[@{req}]` specifier.
    ///
    /// Aliased entries (`"npm:foo@1": "npm:bar@1.0.0"`) yield the target
    /// package's id.
    #[must_use]
    pub fn npm_package_id(&self, name: &str, req: Option<&str>) -> Option<String> {
        let value = self.locked("npm", name, req)?;
        match value.strip_prefix("npm:") {
            Some(id) => Some(id.to_string()),
            None => Some(format!("{name}@{value}")),
        }
    }
}

/// `1.0.6` stays as is; `jsr:@std/path@1.0.6` becomes `1.0.6`.
fn locked_version(value: &str) -> &str {
    let Some((_, rest)) = value.split_once(':') else {
        return value;
    };
    split_package_id(rest).map_or(rest, |(_, version)| version)
}

/// Split `name@version` at the version separator, honoring scopes.
#[must_use]
pub fn split_package_id(id: &str) -> Option<(&str, &str)> {
    let at = id.get(1..)?.find('@')? + 1;
    Some((&id[..at], &id[at + 1..]))
}
