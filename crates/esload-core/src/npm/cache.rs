//! On-disk npm cache layout.
//!
//! ```text
//! {deno_dir}/npm/{registry_host}/{normalized_name}/{version}/          extracted package
//! {deno_dir}/deno_esbuild/{registry_host}/{package_id}/node_modules/   hardlinked tree
//! ```

use crate::paths::{LINK_DIR_NAME, NPM_CACHE_DIR_NAME};
use std::borrow::Cow;
use std::path::PathBuf;
use url::Url;

/// Computes cache and link paths under a cache root.
#[derive(Debug, Clone)]
pub struct NpmCacheLayout {
    deno_dir: PathBuf,
}

impl NpmCacheLayout {
    #[must_use]
    pub fn new(deno_dir: PathBuf) -> Self {
        Self { deno_dir }
    }

    /// `{deno_dir}/npm/{registry_host}`
    #[must_use]
    pub fn registry_dir(&self, registry: &Url) -> PathBuf {
        self.deno_dir
            .join(NPM_CACHE_DIR_NAME)
            .join(registry_host_dir(registry))
    }

    /// Directory holding the extracted files of `name@version`.
    #[must_use]
    pub fn package_dir(&self, registry: &Url, name: &str, version: &str) -> PathBuf {
        self.registry_dir(registry)
            .join(normalize_package_name(name).as_ref())
            .join(version)
    }

    /// The `node_modules` folder built for `package_id`.
    #[must_use]
    pub fn node_modules_dir(&self, registry: &Url, package_id: &str) -> PathBuf {
        self.deno_dir
            .join(LINK_DIR_NAME)
            .join(registry_host_dir(registry))
            .join(package_id)
            .join("node_modules")
    }

    /// Where package `name` is linked inside the `node_modules` of `package_id`.
    #[must_use]
    pub fn link_dir(&self, registry: &Url, package_id: &str, name: &str) -> PathBuf {
        self.node_modules_dir(registry, package_id).join(name)
    }
}

/// Case-normalize a package name for case-insensitive filesystems.
///
/// Names with uppercase characters become `_` followed by the lowercase,
/// unpadded RFC 4648 base32 encoding of the name.
#[must_use]
pub fn normalize_package_name(name: &str) -> Cow<'_, str> {
    if name.chars().any(|c| c.is_ascii_uppercase()) {
        let encoded = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, name.as_bytes());
        Cow::Owned(format!("_{}", encoded.to_ascii_lowercase()))
    } else {
        Cow::Borrowed(name)
    }
}

/// Directory name for a registry: its host, with `_{port}` for a
/// non-default port.
#[must_use]
pub fn registry_host_dir(registry: &Url) -> String {
    let host = registry.host_str().unwrap_or("localhost");
    match registry.port() {
        Some(port) => format!("{host}_{port}"),
        None => host.to_string(),
    }
}
