use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Default JSR registry.
pub const DEFAULT_JSR_REGISTRY: &str = "https://jsr.io/";

/// Default npm registry.
pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable overriding the JSR registry.
pub const JSR_URL_ENV: &str = "JSR_URL";

/// Environment variable overriding the npm registry.
pub const NPM_REGISTRY_ENV: &str = "NPM_CONFIG_REGISTRY";

/// Runtime configuration for the esload CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = WARN, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }
}

/// Options recognized by the loader.
///
/// Every option the resolver and loader honor is listed here; there is no
/// free-form options bag.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Directory used to discover `deno.json` and to resolve bare relative paths.
    pub cwd: PathBuf,
    /// Explicit workspace config file. When `None`, `deno.json`/`deno.jsonc`
    /// is discovered by walking up from `cwd`.
    pub config_path: Option<PathBuf>,
    /// Import map file path or URL. Overrides the config's `importMap`.
    pub import_map: Option<String>,
    /// Lockfile path. Overrides the config's `lock`, else `deno.lock` beside the config.
    pub lock_path: Option<PathBuf>,
    /// Glob patterns for specifiers that are never loaded.
    pub external: Vec<String>,
    /// Cache root (`DENO_DIR`).
    pub deno_dir: PathBuf,
    /// JSR registry base URL, always ending in `/`.
    pub jsr_registry: Url,
    /// Default npm registry URL, always ending in `/`.
    pub npm_registry: Url,
}

impl LoaderOptions {
    /// Create options for `cwd`, taking registries and cache root from the
    /// environment or their defaults.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            config_path: None,
            import_map: None,
            lock_path: None,
            external: Vec::new(),
            deno_dir: paths::deno_dir(),
            jsr_registry: registry_from_env(JSR_URL_ENV, DEFAULT_JSR_REGISTRY),
            npm_registry: registry_from_env(NPM_REGISTRY_ENV, DEFAULT_NPM_REGISTRY),
        }
    }

    /// Set an explicit config file.
    #[must_use]
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    /// Set the import map location.
    #[must_use]
    pub fn with_import_map(mut self, import_map: Option<String>) -> Self {
        self.import_map = import_map;
        self
    }

    /// Set an explicit lockfile.
    #[must_use]
    pub fn with_lock_path(mut self, path: Option<PathBuf>) -> Self {
        self.lock_path = path;
        self
    }

    /// Set external patterns.
    #[must_use]
    pub fn with_external(mut self, external: Vec<String>) -> Self {
        self.external = external;
        self
    }

    /// Set the cache root.
    #[must_use]
    pub fn with_deno_dir(mut self, deno_dir: PathBuf) -> Self {
        self.deno_dir = deno_dir;
        self
    }

    /// Set the JSR registry.
    #[must_use]
    pub fn with_jsr_registry(mut self, registry: Url) -> Self {
        self.jsr_registry = with_trailing_slash(registry);
        self
    }

    /// Set the default npm registry.
    #[must_use]
    pub fn with_npm_registry(mut self, registry: Url) -> Self {
        self.npm_registry = with_trailing_slash(registry);
        self
    }
}

/// Read a registry URL from `var`, falling back to `default` when unset or unparsable.
fn registry_from_env(var: &str, default: &str) -> Url {
    let parsed = std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| Url::parse(v.trim()).ok());

    match parsed {
        Some(url) => with_trailing_slash(url),
        None => Url::parse(default).expect("default registry URL is valid"),
    }
}

/// Ensure a base URL ends in `/` so `Url::join` appends instead of replacing.
#[must_use]
pub fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_registries() {
        std::env::remove_var(JSR_URL_ENV);
        std::env::remove_var(NPM_REGISTRY_ENV);

        let opts = LoaderOptions::new(PathBuf::from("/project"));
        assert_eq!(opts.jsr_registry.as_str(), "https://jsr.io/");
        assert_eq!(opts.npm_registry.as_str(), "https://registry.npmjs.org/");
        assert!(opts.external.is_empty());
    }

    #[test]
    #[serial]
    fn test_jsr_url_env_override() {
        std::env::set_var(JSR_URL_ENV, "http://localhost:4250");
        let opts = LoaderOptions::new(PathBuf::from("/project"));
        std::env::remove_var(JSR_URL_ENV);

        assert_eq!(opts.jsr_registry.as_str(), "http://localhost:4250/");
    }

    #[test]
    #[serial]
    fn test_invalid_env_falls_back() {
        std::env::set_var(JSR_URL_ENV, "not a url");
        let opts = LoaderOptions::new(PathBuf::from("/project"));
        std::env::remove_var(JSR_URL_ENV);

        assert_eq!(opts.jsr_registry.as_str(), DEFAULT_JSR_REGISTRY);
    }

    #[test]
    fn test_with_trailing_slash() {
        let url = with_trailing_slash(Url::parse("https://example.com/registry").unwrap());
        assert_eq!(url.as_str(), "https://example.com/registry/");

        let url = with_trailing_slash(Url::parse("https://example.com/").unwrap());
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new(PathBuf::from("/tmp"))
            .with_verbosity(2)
            .with_json_logs(true);
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
    }
}
