//! Error type shared by every esload component.
//!
//! Errors carry a stable SCREAMING_SNAKE_CASE code plus a human-readable
//! message naming the specifier, status, or path involved. The type is
//! `Clone` so an in-flight fetch can hand the same failure to every waiter.

use std::io;
use std::path::Path;
use thiserror::Error;

/// Error codes, grouped by failure class.
pub mod codes {
    // Parse errors
    pub const SPECIFIER_INVALID: &str = "SPECIFIER_INVALID";
    pub const SPECIFIER_UNSUPPORTED_SCHEME: &str = "SPECIFIER_UNSUPPORTED_SCHEME";

    // Resolution errors
    pub const LOCKFILE_MISSING: &str = "LOCKFILE_MISSING";
    pub const LOCKFILE_INVALID: &str = "LOCKFILE_INVALID";
    pub const LOCKFILE_ENTRY_MISSING: &str = "LOCKFILE_ENTRY_MISSING";
    pub const JSR_EXPORT_MISSING: &str = "JSR_EXPORT_MISSING";
    pub const JSR_MANIFEST_INVALID: &str = "JSR_MANIFEST_INVALID";
    pub const NPM_PACKAGE_UNKNOWN: &str = "NPM_PACKAGE_UNKNOWN";
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";
    pub const IMPORT_MAP_INVALID: &str = "IMPORT_MAP_INVALID";

    // Network errors
    pub const FETCH_STATUS: &str = "FETCH_STATUS";
    pub const FETCH_FAILED: &str = "FETCH_FAILED";
    pub const REDIRECT_MISSING_LOCATION: &str = "REDIRECT_MISSING_LOCATION";
    pub const REDIRECT_SCHEME_DISALLOWED: &str = "REDIRECT_SCHEME_DISALLOWED";
    pub const REDIRECT_LIMIT: &str = "REDIRECT_LIMIT";
    pub const DATA_URL_INVALID: &str = "DATA_URL_INVALID";

    // Filesystem errors
    pub const FS_ERROR: &str = "FS_ERROR";
    pub const NPM_NOT_CACHED: &str = "NPM_NOT_CACHED";
    pub const NPM_LINK_FAILED: &str = "NPM_LINK_FAILED";
    pub const NPM_EXTRACT_FAILED: &str = "NPM_EXTRACT_FAILED";

    // Load errors
    pub const UNSUPPORTED_MEDIA_TYPE: &str = "UNSUPPORTED_MEDIA_TYPE";
}

/// Result alias used throughout the crate.
pub type Result<T, E = LoaderError> = std::result::Result<T, E>;

/// Core error type for esload operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct LoaderError {
    code: &'static str,
    message: String,
}

impl LoaderError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Malformed `npm:` / `jsr:` specifier.
    #[must_use]
    pub fn invalid_specifier(kind: &str, specifier: &str) -> Self {
        Self::new(
            codes::SPECIFIER_INVALID,
            format!("Invalid {kind} specifier: {specifier}"),
        )
    }

    #[must_use]
    pub fn unsupported_scheme(specifier: &str) -> Self {
        Self::new(
            codes::SPECIFIER_UNSUPPORTED_SCHEME,
            format!("Unsupported scheme in specifier: {specifier}"),
        )
    }

    /// Non-success HTTP status.
    #[must_use]
    pub fn fetch_status(status: u16, url: &str) -> Self {
        Self::new(
            codes::FETCH_STATUS,
            format!("Failed to fetch {url}: server responded with status {status}"),
        )
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::FETCH_FAILED, msg)
    }

    /// A filesystem operation on `path` failed.
    #[must_use]
    pub fn fs(action: &str, path: &Path, err: &io::Error) -> Self {
        Self::new(
            codes::FS_ERROR,
            format!("Failed to {action} {}: {err}", path.display()),
        )
    }

    pub fn link_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::NPM_LINK_FAILED, msg)
    }

    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::NPM_EXTRACT_FAILED, msg)
    }
}

impl From<reqwest::Error> for LoaderError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map_or_else(String::new, |u| format!(" {u}"));
        if e.is_timeout() {
            Self::fetch_failed(format!("Request timed out{url}: {e}"))
        } else if e.is_connect() {
            Self::fetch_failed(format!("Connection failed{url}: {e}"))
        } else {
            Self::fetch_failed(e.to_string())
        }
    }
}
