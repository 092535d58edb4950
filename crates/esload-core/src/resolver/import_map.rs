//! Import map evaluation on top of the `import_map` crate.
//!
//! The wrapper only reports whether an entry actually mapped the specifier;
//! unmapped specifiers fall through to the workspace resolver.

use crate::error::{codes, LoaderError, Result};
use ::import_map::{ImportMapDiagnostic, ImportMapError};
use jsonc_parser::ParseOptions;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// A parsed import map. The default value maps nothing.
#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    inner: Option<Parsed>,
}

#[derive(Debug, Clone)]
struct Parsed {
    map: Arc<::import_map::ImportMap>,
    /// Referrer used when the caller has none.
    base: Url,
}

impl ImportMap {
    /// Build an import map from a JSON object with optional `imports` and
    /// `scopes` members. Relative keys and targets resolve against `base`.
    ///
    /// # Errors
    /// Returns `IMPORT_MAP_INVALID` if the document or its members have the
    /// wrong shape.
    pub fn from_value(value: Value, base: &Url) -> Result<Self> {
        let parsed = ::import_map::parse_from_value(base.clone(), value)
            .map_err(|e| invalid(base, &e.to_string()))?;
        log_diagnostics(base, &parsed.diagnostics);
        Ok(Self {
            inner: Some(Parsed {
                map: Arc::new(parsed.import_map),
                base: base.clone(),
            }),
        })
    }

    /// Parse an import map from JSON or JSONC text.
    ///
    /// # Errors
    /// Returns `IMPORT_MAP_INVALID` on malformed text or shape.
    pub fn parse(text: &str, base: &Url) -> Result<Self> {
        let value = jsonc_parser::parse_to_serde_value(text, &ParseOptions::default())
            .map_err(|e| invalid(base, &e.to_string()))?
            .ok_or_else(|| invalid(base, "document is empty"))?;
        Self::from_value(value, base)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Resolve `specifier` through the map. Scopes matching `referrer` are
    /// consulted before the top-level `imports`.
    ///
    /// Returns `Ok(None)` when no entry maps the specifier.
    ///
    /// # Errors
    /// Returns `SPECIFIER_INVALID` when an entry matches but its target
    /// cannot be combined with the rest of the specifier.
    pub fn resolve(&self, specifier: &str, referrer: Option<&Url>) -> Result<Option<Url>> {
        let Some(parsed) = &self.inner else {
            return Ok(None);
        };
        let referrer = referrer.unwrap_or(&parsed.base);

        match parsed.map.resolve(specifier, referrer) {
            Ok(url) => {
                let unmapped = if is_relative(specifier) {
                    referrer.join(specifier).ok()
                } else {
                    Url::parse(specifier).ok()
                };
                Ok((unmapped.as_ref() != Some(&url)).then_some(url))
            }
            Err(ImportMapError::UnmappedBareSpecifier(..)) => Ok(None),
            Err(e) => Err(LoaderError::new(
                codes::SPECIFIER_INVALID,
                format!("Cannot resolve '{specifier}' through the import map: {e}"),
            )),
        }
    }
}

/// Whether a specifier is relative (`/`, `./` or `../`).
#[must_use]
pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with('/') || specifier.starts_with("./") || specifier.starts_with("../")
}

fn log_diagnostics(base: &Url, diagnostics: &[ImportMapDiagnostic]) {
    for diagnostic in diagnostics {
        warn!(import_map = %base, "{diagnostic}");
    }
}

fn invalid(base: &Url, msg: &str) -> LoaderError {
    LoaderError::new(
        codes::IMPORT_MAP_INVALID,
        format!("Invalid import map at {base}: {msg}"),
    )
}
