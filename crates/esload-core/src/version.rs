use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lockfile versions this build reads.
pub use crate::lockfile::SUPPORTED_VERSIONS as LOCKFILE_VERSIONS;

/// User agent sent with every HTTP request.
#[must_use]
pub fn user_agent() -> String {
    format!("esload/{VERSION}")
}

/// Version string for `info` output.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("esload {VERSION}");

    if let Some(hash) = option_env!("ESLOAD_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    s
}
