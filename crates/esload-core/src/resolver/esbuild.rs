//! Conversion between URLs and esbuild `{namespace, path}` resolutions.

use crate::error::{codes, LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// An esbuild resolution result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EsbuildResolution {
    pub namespace: String,
    pub path: String,
}

/// Split a URL for esbuild.
///
/// `file:` URLs map to the `file` namespace with a filesystem path. Every
/// other scheme becomes the namespace, with the rest of the URL as the path.
#[must_use]
pub fn url_to_esbuild_resolution(url: &Url) -> EsbuildResolution {
    if url.scheme() == "file" {
        if let Ok(path) = url.to_file_path() {
            return EsbuildResolution {
                namespace: "file".to_string(),
                path: path.to_string_lossy().into_owned(),
            };
        }
    }

    let scheme = url.scheme();
    EsbuildResolution {
        namespace: scheme.to_string(),
        path: url.as_str()[scheme.len() + 1..].to_string(),
    }
}

/// Rebuild the URL an esbuild resolution came from.
///
/// # Errors
/// Returns `SPECIFIER_INVALID` for a non-absolute `file` path or a path
/// that does not form a valid URL in its namespace.
pub fn esbuild_resolution_to_url(resolution: &EsbuildResolution) -> Result<Url> {
    if resolution.namespace == "file" {
        return Url::from_file_path(Path::new(&resolution.path)).map_err(|()| {
            LoaderError::new(
                codes::SPECIFIER_INVALID,
                format!("Expected an absolute file path, got {}", resolution.path),
            )
        });
    }

    let specifier = format!("{}:{}", resolution.namespace, resolution.path);
    Url::parse(&specifier)
        .map_err(|e| LoaderError::new(codes::SPECIFIER_INVALID, format!("{specifier}: {e}")))
}
