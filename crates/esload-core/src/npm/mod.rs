//! npm package materialization.
//!
//! Resolved npm packages are extracted once into a flat cache, then
//! hardlinked into a per-package `node_modules` tree the bundler can resolve
//! from with Node's algorithm.

mod cache;
mod materialize;
mod package;
mod tarball;

pub use cache::{normalize_package_name, registry_host_dir, NpmCacheLayout};
pub use materialize::{link_dir_atomic, Materializer};
pub use package::{LockfilePackageInfo, NpmPackage, PackageInfoProvider, StaticPackageInfo};
pub use tarball::{download_tarball, extract_tgz_atomic, MAX_TARBALL_SIZE};
