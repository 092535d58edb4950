//! Media type classification.
//!
//! Maps a specifier's extension or an HTTP `Content-Type` header to the
//! source language of a module, and a media type to the bundler loader that
//! can consume it.

use serde::Serialize;
use std::fmt;
use url::Url;

/// Source-language classification of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaType {
    JavaScript,
    Mjs,
    Cjs,
    Jsx,
    TypeScript,
    Mts,
    Cts,
    Tsx,
    Dts,
    Dmts,
    Dcts,
    Json,
    Wasm,
    TsBuildInfo,
    SourceMap,
    Unknown,
}

/// Bundler loader a media type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Loader {
    Js,
    Jsx,
    Ts,
    Tsx,
    Json,
    Binary,
}

impl Loader {
    /// The esbuild loader name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Js => "js",
            Self::Jsx => "jsx",
            Self::Ts => "ts",
            Self::Tsx => "tsx",
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MediaType {
    /// Classify by the specifier's path extension alone.
    ///
    /// `data:` URLs are classified by their embedded MIME type instead.
    #[must_use]
    pub fn from_specifier(url: &Url) -> Self {
        if url.scheme() == "data" {
            return crate::fetch::data_url::mime_type_of(url)
                .map_or(Self::Unknown, |mime| map_content_type(url, Some(&mime)));
        }
        Self::from_path(url.path())
    }

    /// Classify a path (or URL path) by its extension.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_ascii_lowercase();
        let file_name = lower.rsplit('/').next().unwrap_or(&lower);

        if file_name == ".tsbuildinfo" || file_name.ends_with(".tsbuildinfo") {
            return Self::TsBuildInfo;
        }

        let Some((stem, ext)) = file_name.rsplit_once('.') else {
            return Self::Unknown;
        };

        match ext {
            "ts" if stem.ends_with(".d") => Self::Dts,
            "mts" if stem.ends_with(".d") => Self::Dmts,
            "cts" if stem.ends_with(".d") => Self::Dcts,
            "ts" => Self::TypeScript,
            "mts" => Self::Mts,
            "cts" => Self::Cts,
            "tsx" => Self::Tsx,
            "js" => Self::JavaScript,
            "jsx" => Self::Jsx,
            "mjs" => Self::Mjs,
            "cjs" => Self::Cjs,
            "json" => Self::Json,
            "wasm" => Self::Wasm,
            "map" => Self::SourceMap,
            _ => Self::Unknown,
        }
    }

    /// The loader for this media type, or `None` when the module must not be
    /// bundled as code (declarations, build info, source maps, unknown).
    #[must_use]
    pub fn loader(&self) -> Option<Loader> {
        match self {
            Self::JavaScript | Self::Mjs | Self::Cjs => Some(Loader::Js),
            Self::Jsx => Some(Loader::Jsx),
            Self::TypeScript | Self::Mts | Self::Cts => Some(Loader::Ts),
            Self::Tsx => Some(Loader::Tsx),
            Self::Json => Some(Loader::Json),
            Self::Wasm => Some(Loader::Binary),
            Self::Dts
            | Self::Dmts
            | Self::Dcts
            | Self::TsBuildInfo
            | Self::SourceMap
            | Self::Unknown => None,
        }
    }
}

/// Classify a module from its URL and optional `Content-Type` header.
///
/// The MIME type is matched case-insensitively with parameters stripped.
/// Generic types (`text/plain`, `application/octet-stream`) and a missing
/// header fall back to the URL's extension, except for `data:` URLs, whose
/// path is the payload.
#[must_use]
pub fn map_content_type(url: &Url, content_type: Option<&str>) -> MediaType {
    let Some(content_type) = content_type else {
        return MediaType::from_specifier(url);
    };

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/typescript"
        | "text/typescript"
        | "application/x-typescript"
        | "video/vnd.dlna.mpeg-tts"
        | "video/mp2t" => refine_js_like(url, MediaType::TypeScript),
        "application/javascript"
        | "text/javascript"
        | "application/ecmascript"
        | "text/ecmascript"
        | "application/x-javascript"
        | "application/node" => refine_js_like(url, MediaType::JavaScript),
        "text/jsx" => MediaType::Jsx,
        "text/tsx" => MediaType::Tsx,
        "application/json" | "text/json" => MediaType::Json,
        "application/wasm" => MediaType::Wasm,
        "text/plain" | "application/octet-stream" if url.scheme() != "data" => {
            MediaType::from_path(url.path())
        }
        _ => MediaType::Unknown,
    }
}

/// A JS-like MIME keeps its family unless the extension names a precise variant.
fn refine_js_like(url: &Url, default: MediaType) -> MediaType {
    if url.scheme() == "data" {
        return default;
    }
    match MediaType::from_path(url.path()) {
        ext @ (MediaType::Jsx
        | MediaType::Tsx
        | MediaType::Dts
        | MediaType::Dmts
        | MediaType::Dcts
        | MediaType::Mjs
        | MediaType::Cjs
        | MediaType::Mts
        | MediaType::Cts) => ext,
        _ => default,
    }
}
