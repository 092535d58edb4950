//! npm package metadata providers.

use crate::lockfile::{split_package_id, Lockfile};
use std::collections::HashMap;
use url::Url;

/// A resolved npm package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpmPackage {
    /// Package id, `name@version` plus an optional `_peer` suffix.
    pub id: String,
    pub name: String,
    pub version: String,
    /// Registry the package is downloaded from. `None` means it must
    /// already be in the cache.
    pub registry_url: Option<Url>,
    /// Package ids of direct dependencies.
    pub dependencies: Vec<String>,
}

impl NpmPackage {
    /// Build a package from its id, splitting off name, version and any
    /// peer-dependency suffix.
    #[must_use]
    pub fn from_id(id: &str, registry_url: Option<Url>, dependencies: Vec<String>) -> Option<Self> {
        let (name, rest) = split_package_id(id)?;
        let version = rest.split_once('_').map_or(rest, |(v, _)| v);
        if name.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            registry_url,
            dependencies,
        })
    }

    /// Tarball URL: `{registry}/{name}/-/{unscoped}-{version}.tgz`.
    #[must_use]
    pub fn tarball_url(&self) -> Option<Url> {
        let registry = self.registry_url.as_ref()?;
        let unscoped = crate::specifier::unscoped_name(&self.name);
        registry
            .join(&format!("{}/-/{unscoped}-{}.tgz", self.name, self.version))
            .ok()
    }
}

/// Source of npm package metadata.
pub trait PackageInfoProvider: Send + Sync {
    /// Look up a package by id.
    fn package(&self, id: &str) -> Option<NpmPackage>;

    /// Map an `npm:{name}[@{req}]` request to a package id.
    fn resolve_req(&self, name: &str, req: Option<&str>) -> Option<String>;
}

/// In-memory provider, filled explicitly.
#[derive(Debug, Clone, Default)]
pub struct StaticPackageInfo {
    packages: HashMap<String, NpmPackage>,
    reqs: HashMap<String, String>,
}

impl StaticPackageInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package.
    #[must_use]
    pub fn with_package(mut self, package: NpmPackage) -> Self {
        self.packages.insert(package.id.clone(), package);
        self
    }

    /// Map `name[@req]` to a package id.
    #[must_use]
    pub fn with_req(mut self, req: &str, id: &str) -> Self {
        self.reqs.insert(req.to_string(), id.to_string());
        self
    }
}

impl PackageInfoProvider for StaticPackageInfo {
    fn package(&self, id: &str) -> Option<NpmPackage> {
        self.packages.get(id).cloned()
    }

    fn resolve_req(&self, name: &str, req: Option<&str>) -> Option<String> {
        let key = match req {
            Some(req) => format!("{name}@{req}"),
            None => name.to_string(),
        };
        self.reqs.get(&key).cloned()
    }
}

/// Provider backed by a lockfile's `npm` and `specifiers` sections.
#[derive(Debug, Clone)]
pub struct LockfilePackageInfo {
    lockfile: Lockfile,
    registry_url: Url,
}

impl LockfilePackageInfo {
    #[must_use]
    pub fn new(lockfile: Lockfile, registry_url: Url) -> Self {
        Self {
            lockfile,
            registry_url,
        }
    }
}

impl PackageInfoProvider for LockfilePackageInfo {
    fn package(&self, id: &str) -> Option<NpmPackage> {
        let entry = self.lockfile.npm.get(id)?;
        NpmPackage::from_id(
            id,
            Some(self.registry_url.clone()),
            entry.dependencies.clone(),
        )
    }

    fn resolve_req(&self, name: &str, req: Option<&str>) -> Option<String> {
        let id = self.lockfile.npm_package_id(name, req)?;
        self.lockfile.npm.contains_key(&id).then_some(id)
    }
}
