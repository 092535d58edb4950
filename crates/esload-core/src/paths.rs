use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root.
pub const DENO_DIR_ENV: &str = "DENO_DIR";

/// Config file names, in discovery order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["deno.json", "deno.jsonc"];

/// Default lockfile name, looked up beside the config file.
pub const LOCKFILE_NAME: &str = "deno.lock";

/// Directory under the cache root holding linked `node_modules` trees.
pub const LINK_DIR_NAME: &str = "deno_esbuild";

/// Directory under the cache root holding the flat npm package cache.
pub const NPM_CACHE_DIR_NAME: &str = "npm";

/// Find the nearest config file by walking up from `cwd`.
///
/// Returns the first `deno.json` or `deno.jsonc` found, or `None`.
#[must_use]
pub fn find_config_file(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        for name in CONFIG_FILE_NAMES {
            let candidate = current.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the cache root.
///
/// Respects `DENO_DIR`, otherwise uses platform-appropriate locations:
/// - Linux: `$XDG_CACHE_HOME/deno` or `~/.cache/deno`
/// - macOS: `~/Library/Caches/deno`
/// - Windows: `%LOCALAPPDATA%\deno`
#[must_use]
pub fn deno_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DENO_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }

    dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".deno"),
                |p| p.join(".cache").join("deno"),
            )
        },
        |p| p.join("deno"),
    )
}
