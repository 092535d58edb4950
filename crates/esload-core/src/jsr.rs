//! JSR specifier resolution through the lockfile.
//!
//! A `jsr:` specifier is pinned to an exact version by the lockfile, then
//! mapped to a module URL through the package's version manifest
//! (`{registry}/{name}/{version}_meta.json`).

use crate::error::{codes, LoaderError, Result};
use crate::fetch::FetchCache;
use crate::lockfile::Lockfile;
use crate::specifier::PackageRef;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// The parts of a version manifest used for resolution.
#[derive(Debug, Deserialize)]
struct VersionManifest {
    #[serde(default)]
    exports: BTreeMap<String, String>,
}

/// A JSR resolution session.
///
/// The lockfile is loaded on first use and released when the session is
/// dropped.
pub struct JsrResolver {
    fetch: Arc<FetchCache>,
    registry: Url,
    lock_path: Option<PathBuf>,
    lockfile: OnceCell<Arc<Lockfile>>,
}

impl JsrResolver {
    /// Create a session. `lock_path` of `None` means locking is disabled,
    /// which makes every `jsr:` resolution fail.
    #[must_use]
    pub fn new(fetch: Arc<FetchCache>, registry: Url, lock_path: Option<PathBuf>) -> Self {
        Self {
            fetch,
            registry: crate::config::with_trailing_slash(registry),
            lock_path,
            lockfile: OnceCell::new(),
        }
    }

    /// The session's lockfile, loaded once.
    ///
    /// # Errors
    /// Returns `LOCKFILE_MISSING` when locking is disabled or the file does
    /// not exist, and `LOCKFILE_INVALID` when it cannot be parsed.
    pub async fn lockfile(&self) -> Result<Arc<Lockfile>> {
        self.lockfile
            .get_or_try_init(|| async {
                let path = self.lock_path.as_deref().ok_or_else(|| {
                    LoaderError::new(
                        codes::LOCKFILE_MISSING,
                        "jsr: specifiers require a lockfile, but locking is disabled",
                    )
                })?;
                Lockfile::load(path).map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Resolve a `jsr:` package reference to its module URL.
    ///
    /// # Errors
    /// Returns an error if there is no lockfile, no lockfile entry for the
    /// specifier, the manifest cannot be fetched or parsed, or the requested
    /// export does not exist.
    pub async fn resolve_jsr_specifier(&self, package: &PackageRef) -> Result<Url> {
        let lockfile = self.lockfile().await?;

        let key = format!("jsr:{}", package.package_req());
        let version = lockfile
            .jsr_version(&package.name, package.version.as_deref())
            .ok_or_else(|| {
                LoaderError::new(
                    codes::LOCKFILE_ENTRY_MISSING,
                    format!("No lockfile entry for {key} in {}", lockfile.path.display()),
                )
            })?;

        let manifest_url = self.join(&format!("{}/{version}_meta.json", package.name))?;
        let module = self.fetch.load_remote(manifest_url.as_str()).await?;
        let manifest: VersionManifest = serde_json::from_slice(&module.data).map_err(|e| {
            LoaderError::new(
                codes::JSR_MANIFEST_INVALID,
                format!("Invalid JSR manifest {manifest_url}: {e}"),
            )
        })?;

        let export = package
            .path
            .as_deref()
            .map_or_else(|| ".".to_string(), |p| format!(".{p}"));
        let target = manifest.exports.get(&export).ok_or_else(|| {
            LoaderError::new(
                codes::JSR_EXPORT_MISSING,
                format!(
                    "Package {}@{version} does not export '{export}'",
                    package.name
                ),
            )
        })?;

        let url = self.join(&format!(
            "{}/{version}/{}",
            package.name,
            target.trim_start_matches("./")
        ))?;
        debug!(specifier = %key, version, export = %export, url = %url, "resolved jsr specifier");
        Ok(url)
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.registry.join(path).map_err(|e| {
            LoaderError::new(
                codes::SPECIFIER_INVALID,
                format!("Cannot build JSR URL for {path}: {e}"),
            )
        })
    }
}

impl Drop for JsrResolver {
    fn drop(&mut self) {
        if let Some(lockfile) = self.lockfile.get() {
            debug!(path = %lockfile.path.display(), "released lockfile");
        }
    }
}

impl std::fmt::Debug for JsrResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsrResolver")
            .field("registry", &self.registry.as_str())
            .field("lock_path", &self.lock_path)
            .field("loaded", &self.lockfile.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Transport, TransportResponse};
    use crate::specifier::parse_jsr_specifier;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Manifests(HashMap<String, String>);

    #[async_trait]
    impl Transport for Manifests {
        async fn get(&self, url: &Url) -> Result<TransportResponse> {
            Ok(match self.0.get(url.as_str()) {
                Some(body) => TransportResponse::ok(Some("application/json"), body.clone()),
                None => TransportResponse::status(404),
            })
        }
    }

    const LOCK: &str = r#"{
        "version": "4",
        "specifiers": { "jsr:@std/path@^1.0.0": "1.0.6", "jsr:@std/fs": "1.0.4" },
        "jsr": { "@std/path@1.0.6": { "integrity": "x" } }
    }"#;

    fn session(dir: &TempDir) -> JsrResolver {
        let lock_path = dir.path().join("deno.lock");
        fs::write(&lock_path, LOCK).unwrap();
        let transport = Manifests(HashMap::from([(
            "https://jsr.io/@std/path/1.0.6_meta.json".to_string(),
            r#"{ "exports": { ".": "./mod.ts", "./posix": "./posix/mod.ts" } }"#.to_string(),
        )]));
        JsrResolver::new(
            Arc::new(FetchCache::new(Arc::new(transport))),
            Url::parse("https://jsr.io").unwrap(),
            Some(lock_path),
        )
    }

    fn jsr(s: &str) -> PackageRef {
        parse_jsr_specifier(&Url::parse(s).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_default_export() {
        let dir = tempdir().unwrap();
        let url = session(&dir)
            .resolve_jsr_specifier(&jsr("jsr:@std/path@^1.0.0"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://jsr.io/@std/path/1.0.6/mod.ts");
    }

    #[tokio::test]
    async fn test_resolve_subpath_export() {
        let dir = tempdir().unwrap();
        let url = session(&dir)
            .resolve_jsr_specifier(&jsr("jsr:@std/path@^1.0.0/posix"))
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://jsr.io/@std/path/1.0.6/posix/mod.ts");
    }

    #[tokio::test]
    async fn test_missing_export() {
        let dir = tempdir().unwrap();
        let err = session(&dir)
            .resolve_jsr_specifier(&jsr("jsr:@std/path@^1.0.0/windows"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::JSR_EXPORT_MISSING);
        assert!(err.message().contains("@std/path@1.0.6"));
        assert!(err.message().contains("./windows"));
    }

    #[tokio::test]
    async fn test_missing_lockfile_entry() {
        let dir = tempdir().unwrap();
        let err = session(&dir)
            .resolve_jsr_specifier(&jsr("jsr:@std/assert@^1.0.0"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::LOCKFILE_ENTRY_MISSING);
        assert!(err.message().contains("jsr:@std/assert@^1.0.0"));
    }

    #[tokio::test]
    async fn test_manifest_fetch_failure() {
        let dir = tempdir().unwrap();
        let err = session(&dir)
            .resolve_jsr_specifier(&jsr("jsr:@std/fs"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::FETCH_STATUS);
        assert!(err.message().contains("@std/fs/1.0.4_meta.json"));
    }

    #[tokio::test]
    async fn test_missing_lockfile() {
        let dir = tempdir().unwrap();
        let resolver = JsrResolver::new(
            Arc::new(FetchCache::new(Arc::new(Manifests(HashMap::new())))),
            Url::parse("https://jsr.io/").unwrap(),
            Some(dir.path().join("deno.lock")),
        );
        let err = resolver
            .resolve_jsr_specifier(&jsr("jsr:@std/path"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::LOCKFILE_MISSING);

        let disabled = JsrResolver::new(
            Arc::new(FetchCache::new(Arc::new(Manifests(HashMap::new())))),
            Url::parse("https://jsr.io/").unwrap(),
            None,
        );
        let err = disabled
            .resolve_jsr_specifier(&jsr("jsr:@std/path"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), codes::LOCKFILE_MISSING);
    }

    #[tokio::test]
    async fn test_lockfile_loaded_once() {
        let dir = tempdir().unwrap();
        let resolver = session(&dir);
        let first = resolver.lockfile().await.unwrap();
        fs::remove_file(dir.path().join("deno.lock")).unwrap();
        let second = resolver.lockfile().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
