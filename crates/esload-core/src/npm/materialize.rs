//! Builds hardlinked `node_modules` trees for npm packages.

use super::cache::NpmCacheLayout;
use super::package::{NpmPackage, PackageInfoProvider};
use super::tarball;
use crate::error::{codes, LoaderError, Result};
use crate::fetch::Transport;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

/// Materializes npm packages as `node_modules` directories, once per package id.
pub struct Materializer {
    layout: NpmCacheLayout,
    default_registry: Url,
    packages: Arc<dyn PackageInfoProvider>,
    transport: Arc<dyn Transport>,
    link_dirs: Mutex<HashMap<String, Arc<OnceCell<PathBuf>>>>,
    link_builds: AtomicUsize,
}

impl Materializer {
    #[must_use]
    pub fn new(
        layout: NpmCacheLayout,
        default_registry: Url,
        packages: Arc<dyn PackageInfoProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            layout,
            default_registry,
            packages,
            transport,
            link_dirs: Mutex::new(HashMap::new()),
            link_builds: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn packages(&self) -> &Arc<dyn PackageInfoProvider> {
        &self.packages
    }

    /// Number of link trees this materializer has built (fast-path hits
    /// and cache hits excluded).
    #[must_use]
    pub fn link_builds(&self) -> usize {
        self.link_builds.load(Ordering::SeqCst)
    }

    /// The `node_modules/{name}` directory for `package_id`, building it on
    /// first use.
    ///
    /// Concurrent first calls for the same id share one build. A failed
    /// build is not cached.
    ///
    /// # Errors
    /// Returns an error if the package is unknown, not cached and not
    /// downloadable, or linking fails.
    pub async fn node_modules_dir_for_package(&self, package_id: &str) -> Result<PathBuf> {
        let cell = self
            .link_dirs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(package_id.to_string())
            .or_default()
            .clone();

        cell.get_or_try_init(|| self.build(package_id))
            .await
            .cloned()
    }

    async fn build(&self, package_id: &str) -> Result<PathBuf> {
        let package = self.package(package_id, None)?;
        let registry = self.registry_for(&package);
        let link_dir = self.layout.link_dir(&registry, package_id, &package.name);

        if link_dir.exists() {
            debug!(package_id, link_dir = %link_dir.display(), "node_modules already linked");
            return Ok(link_dir);
        }

        let node_modules = self.layout.node_modules_dir(&registry, package_id);

        // Dependencies first so an existing `link_dir` implies a complete tree.
        for dep in self.dependency_closure(&package)? {
            let source = self.ensure_package_dir(&dep).await?;
            link_package(source, node_modules.join(&dep.name)).await?;
        }

        let source = self.ensure_package_dir(&package).await?;
        link_package(source, link_dir.clone()).await?;

        self.link_builds.fetch_add(1, Ordering::SeqCst);
        debug!(package_id, link_dir = %link_dir.display(), "linked npm package");
        Ok(link_dir)
    }

    fn package(&self, id: &str, parent: Option<&str>) -> Result<NpmPackage> {
        self.packages.package(id).ok_or_else(|| {
            let message = match parent {
                Some(parent) => format!("Unknown npm package {id} (dependency of {parent})"),
                None => format!("Unknown npm package {id}"),
            };
            LoaderError::new(codes::NPM_PACKAGE_UNKNOWN, message)
        })
    }

    fn registry_for(&self, package: &NpmPackage) -> Url {
        package
            .registry_url
            .clone()
            .unwrap_or_else(|| self.default_registry.clone())
    }

    /// Transitive dependencies, breadth-first. The first package seen for a
    /// name wins; the root's own name is never shadowed.
    fn dependency_closure(&self, root: &NpmPackage) -> Result<Vec<NpmPackage>> {
        let mut seen_names = HashSet::from([root.name.clone()]);
        let mut seen_ids = HashSet::from([root.id.clone()]);
        let mut queue: VecDeque<(String, String)> = root
            .dependencies
            .iter()
            .map(|d| (d.clone(), root.id.clone()))
            .collect();
        let mut closure = Vec::new();

        while let Some((id, parent)) = queue.pop_front() {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            let package = self.package(&id, Some(&parent))?;
            queue.extend(
                package
                    .dependencies
                    .iter()
                    .map(|d| (d.clone(), package.id.clone())),
            );
            if seen_names.insert(package.name.clone()) {
                closure.push(package);
            }
        }

        Ok(closure)
    }

    /// The extracted package directory, downloading it when missing.
    async fn ensure_package_dir(&self, package: &NpmPackage) -> Result<PathBuf> {
        let registry = self.registry_for(package);
        let package_dir = self
            .layout
            .package_dir(&registry, &package.name, &package.version);

        if package_dir.is_dir() {
            return Ok(package_dir);
        }

        let Some(url) = package.tarball_url() else {
            return Err(LoaderError::new(
                codes::NPM_NOT_CACHED,
                format!(
                    "npm package {} is not cached at {}",
                    package.id,
                    package_dir.display()
                ),
            ));
        };

        debug!(package_id = %package.id, url = %url, "downloading npm tarball");
        let bytes = tarball::download_tarball(self.transport.as_ref(), &url).await?;

        let dest = package_dir.clone();
        tokio::task::spawn_blocking(move || tarball::extract_tgz_atomic(&bytes, &dest))
            .await
            .map_err(|e| LoaderError::extract_failed(format!("Extraction task failed: {e}")))??;

        Ok(package_dir)
    }
}

impl std::fmt::Debug for Materializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("layout", &self.layout)
            .field("default_registry", &self.default_registry.as_str())
            .field("link_builds", &self.link_builds())
            .finish_non_exhaustive()
    }
}

async fn link_package(from: PathBuf, to: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || link_dir_atomic(&from, &to))
        .await
        .map_err(|e| LoaderError::link_failed(format!("Link task failed: {e}")))?
}

/// Hardlink the tree at `from` into `to` via a temp directory and rename.
///
/// If `to` already exists, or appears while linking, this succeeds without
/// changes.
pub fn link_dir_atomic(from: &Path, to: &Path) -> Result<()> {
    link_dir_atomic_with(from, to, || {})
}

/// [`link_dir_atomic`] with a hook run just before the final rename.
fn link_dir_atomic_with(from: &Path, to: &Path, before_rename: impl FnOnce()) -> Result<()> {
    if to.exists() {
        return Ok(());
    }

    let parent = to
        .parent()
        .ok_or_else(|| LoaderError::link_failed(format!("{} has no parent", to.display())))?;
    fs::create_dir_all(parent).map_err(|e| LoaderError::fs("create", parent, &e))?;

    let temp = tempfile::Builder::new()
        .prefix(".tmp-link-")
        .tempdir_in(parent)
        .map_err(|e| LoaderError::fs("create temp dir in", parent, &e))?;

    esload_util::fs::hard_link_dir_recursive(from, temp.path()).map_err(|e| {
        LoaderError::link_failed(format!(
            "Failed to hardlink {} into {}: {e}",
            from.display(),
            to.display()
        ))
    })?;

    before_rename();
    match fs::rename(temp.path(), to) {
        Ok(()) => Ok(()),
        Err(e) if to.exists() => {
            debug!(path = %to.display(), error = %e, "link dir created concurrently");
            Ok(())
        }
        Err(e) => Err(LoaderError::link_failed(format!(
            "Failed to rename {} to {}: {e}",
            temp.path().display(),
            to.display()
        ))),
    }
}
