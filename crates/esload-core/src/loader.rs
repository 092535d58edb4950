//! The loader: resolution and loading entry points for the bundler.
//!
//! One [`Loader`] owns every cache for a build: the remote fetch cache, the
//! npm materializer, the workspace model and the JSR session.

use crate::config::LoaderOptions;
use crate::error::{codes, LoaderError, Result};
use crate::fetch::{FetchCache, Transport};
use crate::jsr::JsrResolver;
use crate::media_type::{self, MediaType};
use crate::npm::{LockfilePackageInfo, Materializer, NpmCacheLayout, PackageInfoProvider};
use crate::resolver::{url_to_esbuild_resolution, WorkspaceResolver};
use crate::specifier::{PackageRef, Specifier};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use url::Url;

/// Where a specifier resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResolvedModule {
    /// An ES module loaded from disk, the network, or a `data:` URL.
    Esm { specifier: Url },
    /// A module inside a materialized npm package.
    Npm {
        package_id: String,
        package_name: String,
        path: Option<String>,
    },
    /// A Node built-in.
    Node { path: String },
    /// Matched an external pattern; never loaded.
    External { specifier: String },
}

/// A loaded module ready for the bundler.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    /// Final specifier, after redirects.
    pub specifier: Url,
    pub media_type: MediaType,
    pub loader: media_type::Loader,
    pub contents: Bytes,
}

pub struct Loader {
    resolver: WorkspaceResolver,
    fetch: Arc<FetchCache>,
    transport: Arc<dyn Transport>,
    external: Vec<glob::Pattern>,
    /// Explicit npm metadata. `None` means the lockfile provides it.
    packages: Option<Arc<dyn PackageInfoProvider>>,
    materializer: Mutex<Option<Arc<Materializer>>>,
    jsr: Mutex<Option<Arc<JsrResolver>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Loader {
    /// Create a loader.
    ///
    /// # Errors
    /// Returns `CONFIG_INVALID` if an external pattern is not a valid glob.
    pub fn new(
        options: LoaderOptions,
        transport: Arc<dyn Transport>,
        packages: Option<Arc<dyn PackageInfoProvider>>,
    ) -> Result<Self> {
        let external = options
            .external
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|e| {
                    LoaderError::new(
                        codes::CONFIG_INVALID,
                        format!("Invalid external pattern '{pattern}': {e}"),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            resolver: WorkspaceResolver::new(options),
            fetch: Arc::new(FetchCache::new(Arc::clone(&transport))),
            transport,
            external,
            packages,
            materializer: Mutex::new(None),
            jsr: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn options(&self) -> &LoaderOptions {
        self.resolver.options()
    }

    /// Resolve a specifier.
    ///
    /// Returns `Ok(None)` when the specifier cannot be resolved from the
    /// given context, leaving it to other resolvers.
    ///
    /// # Errors
    /// Returns parse errors for malformed specifiers and resolution errors
    /// for `npm:`/`jsr:` specifiers the lockfile cannot satisfy.
    pub async fn resolve(
        &self,
        specifier: &str,
        referrer: Option<&Url>,
        resolve_dir: Option<&Path>,
    ) -> Result<Option<ResolvedModule>> {
        let Some(url) = self.resolver.resolve(specifier, referrer, resolve_dir)? else {
            debug!(specifier, "no resolution");
            return Ok(None);
        };

        if self.is_external(&url) {
            return Ok(Some(ResolvedModule::External {
                specifier: url.to_string(),
            }));
        }

        let resolved = match Specifier::parse(&url)? {
            Specifier::File(url) | Specifier::Http(url) | Specifier::Data(url) => {
                ResolvedModule::Esm { specifier: url }
            }
            Specifier::Node(path) => ResolvedModule::Node { path },
            Specifier::Npm(package) => {
                let package_id = self.npm_package_id(&package).await?;
                ResolvedModule::Npm {
                    package_id,
                    package_name: package.name,
                    path: package.path,
                }
            }
            Specifier::Jsr(package) => {
                let url = self.jsr()?.resolve_jsr_specifier(&package).await?;
                if self.is_external(&url) {
                    ResolvedModule::External {
                        specifier: url.to_string(),
                    }
                } else {
                    ResolvedModule::Esm { specifier: url }
                }
            }
        };

        debug!(specifier, resolved = ?resolved, "resolved");
        Ok(Some(resolved))
    }

    /// Load an ES module. `file:` URLs are read from disk; `http(s):` and
    /// `data:` URLs go through the fetch cache.
    ///
    /// # Errors
    /// Returns an error if the module cannot be read or fetched, or its
    /// media type has no bundler loader.
    pub async fn load_esm(&self, url: &Url) -> Result<LoadedModule> {
        let (specifier, media_type, contents) = match url.scheme() {
            "file" => {
                let path = url.to_file_path().map_err(|()| {
                    LoaderError::new(codes::SPECIFIER_INVALID, format!("Invalid file URL {url}"))
                })?;
                let contents = tokio::fs::read(&path)
                    .await
                    .map_err(|e| LoaderError::fs("read", &path, &e))?;
                (url.clone(), MediaType::from_specifier(url), Bytes::from(contents))
            }
            "http" | "https" | "data" => {
                let module = self.fetch.load_remote(url.as_str()).await?;
                let specifier = Url::parse(&module.specifier).unwrap_or_else(|_| url.clone());
                (specifier, module.media_type, module.data.clone())
            }
            _ => return Err(LoaderError::unsupported_scheme(url.as_str())),
        };

        let loader = media_type.loader().ok_or_else(|| {
            LoaderError::new(
                codes::UNSUPPORTED_MEDIA_TYPE,
                format!("Unsupported media type {media_type} for {specifier}"),
            )
        })?;

        Ok(LoadedModule {
            specifier,
            media_type,
            loader,
            contents,
        })
    }

    /// Filesystem path of an npm resolution, materializing the package.
    ///
    /// # Errors
    /// Returns an error if `resolved` is not an npm module or the package
    /// cannot be materialized.
    pub async fn npm_path(&self, resolved: &ResolvedModule) -> Result<PathBuf> {
        let ResolvedModule::Npm {
            package_id, path, ..
        } = resolved
        else {
            return Err(LoaderError::new(
                codes::SPECIFIER_INVALID,
                format!("Not an npm module: {resolved:?}"),
            ));
        };

        if let Some(sub) = path {
            if Path::new(sub)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
            {
                return Err(LoaderError::new(
                    codes::SPECIFIER_INVALID,
                    format!("npm sub-path escapes package {package_id}: {sub}"),
                ));
            }
        }

        let dir = self
            .materializer()
            .await?
            .node_modules_dir_for_package(package_id)
            .await?;

        Ok(match path {
            Some(sub) => dir.join(sub.trim_start_matches('/')),
            None => dir,
        })
    }

    /// Drop the workspace model and the JSR session. Call when a build ends
    /// or its entry points change.
    pub fn reset_workspace(&self) {
        self.resolver.reset();
        *lock(&self.jsr) = None;
        if self.packages.is_none() {
            *lock(&self.materializer) = None;
        }
        debug!("workspace reset");
    }

    fn is_external(&self, url: &Url) -> bool {
        if self.external.is_empty() {
            return false;
        }
        let esbuild_path = url_to_esbuild_resolution(url).path;
        self.external
            .iter()
            .any(|p| p.matches(url.as_str()) || p.matches(&esbuild_path))
    }

    fn jsr(&self) -> Result<Arc<JsrResolver>> {
        let mut slot = lock(&self.jsr);
        if let Some(jsr) = slot.as_ref() {
            return Ok(Arc::clone(jsr));
        }
        let workspace = self.resolver.workspace()?;
        let jsr = Arc::new(JsrResolver::new(
            Arc::clone(&self.fetch),
            self.options().jsr_registry.clone(),
            workspace.lock_path.clone(),
        ));
        *slot = Some(Arc::clone(&jsr));
        Ok(jsr)
    }

    /// The materializer, built on first use. Without an explicit provider,
    /// npm metadata comes from the session lockfile.
    async fn materializer(&self) -> Result<Arc<Materializer>> {
        let existing = lock(&self.materializer).clone();
        if let Some(materializer) = existing {
            return Ok(materializer);
        }

        let packages: Arc<dyn PackageInfoProvider> = match &self.packages {
            Some(packages) => Arc::clone(packages),
            None => {
                let lockfile = self.jsr()?.lockfile().await?;
                Arc::new(LockfilePackageInfo::new(
                    (*lockfile).clone(),
                    self.options().npm_registry.clone(),
                ))
            }
        };

        let mut slot = lock(&self.materializer);
        // A concurrent caller may have built one while the lockfile loaded.
        let materializer = slot
            .get_or_insert_with(|| Arc::new(self.new_materializer(packages)))
            .clone();
        Ok(materializer)
    }

    async fn npm_package_id(&self, package: &PackageRef) -> Result<String> {
        let materializer = self.materializer().await?;
        let packages = materializer.packages();

        if let Some(id) = packages.resolve_req(&package.name, package.version.as_deref()) {
            return Ok(id);
        }
        // An exact version may name a package id directly.
        if let Some(version) = &package.version {
            let id = format!("{}@{version}", package.name);
            if packages.package(&id).is_some() {
                return Ok(id);
            }
        }

        Err(LoaderError::new(
            codes::NPM_PACKAGE_UNKNOWN,
            format!("Cannot resolve npm:{} to a locked package", package.package_req()),
        ))
    }

    fn new_materializer(&self, packages: Arc<dyn PackageInfoProvider>) -> Materializer {
        Materializer::new(
            NpmCacheLayout::new(self.options().deno_dir.clone()),
            self.options().npm_registry.clone(),
            packages,
            Arc::clone(&self.transport),
        )
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("options", self.options())
            .field("fetch", &self.fetch)
            .finish_non_exhaustive()
    }
}
