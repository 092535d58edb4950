//! Workspace configuration (`deno.json` / `deno.jsonc`).

use super::import_map::ImportMap;
use crate::config::LoaderOptions;
use crate::error::{codes, LoaderError, Result};
use crate::paths;
use jsonc_parser::ParseOptions;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Raw config file shape. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    name: Option<String>,
    version: Option<String>,
    exports: Option<Value>,
    imports: Option<Value>,
    scopes: Option<Value>,
    import_map: Option<String>,
    lock: Option<Value>,
    workspace: Option<Value>,
}

/// A workspace member package that resolves to local files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMember {
    pub name: String,
    pub version: Option<String>,
    pub dir: PathBuf,
    /// Export key (`.`, `./sub`) → path relative to `dir`.
    pub exports: BTreeMap<String, String>,
}

impl WorkspaceMember {
    /// File URL for an export key, if the member exports it.
    #[must_use]
    pub fn export_url(&self, export: &str) -> Option<Url> {
        let target = self.exports.get(export)?;
        let dir = Url::from_directory_path(&self.dir).ok()?;
        dir.join(target.trim_start_matches("./")).ok()
    }
}

/// The loaded workspace model: import map, lockfile location and members.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceConfig {
    /// The config file this model was read from, if any.
    pub config_path: Option<PathBuf>,
    pub import_map: ImportMap,
    /// Lockfile location; `None` when locking is disabled.
    pub lock_path: Option<PathBuf>,
    pub members: Vec<WorkspaceMember>,
}

impl WorkspaceConfig {
    /// Load the workspace model for `options`.
    ///
    /// Uses `options.config_path` when set, otherwise discovers the nearest
    /// config file upward from `options.cwd`. A missing config yields an
    /// empty model with the lockfile defaulting to `{cwd}/deno.lock`.
    ///
    /// # Errors
    /// Returns an error if a config file or import map exists but cannot be
    /// read or parsed.
    pub fn load(options: &LoaderOptions) -> Result<Self> {
        let config_path = match &options.config_path {
            Some(path) if path.is_absolute() => Some(path.clone()),
            Some(path) => Some(options.cwd.join(path)),
            None => paths::find_config_file(&options.cwd),
        };

        let Some(config_path) = config_path else {
            let import_map = match &options.import_map {
                Some(location) => load_import_map(location, &options.cwd)?,
                None => ImportMap::default(),
            };
            return Ok(Self {
                config_path: None,
                import_map,
                lock_path: Some(
                    options
                        .lock_path
                        .clone()
                        .unwrap_or_else(|| options.cwd.join(paths::LOCKFILE_NAME)),
                ),
                members: Vec::new(),
            });
        };

        debug!(path = %config_path.display(), "loading workspace config");
        let raw = read_config(&config_path)?;
        let config_dir = config_path
            .parent()
            .map_or_else(|| options.cwd.clone(), Path::to_path_buf);

        let import_map = match (&options.import_map, &raw.import_map) {
            (Some(location), _) => load_import_map(location, &options.cwd)?,
            (None, Some(location)) => load_import_map(location, &config_dir)?,
            (None, None) => inline_import_map(&raw, &config_path)?,
        };

        let lock_path = match &options.lock_path {
            Some(path) => Some(path.clone()),
            None => lock_setting(raw.lock.as_ref(), &config_dir, &config_path)?,
        };

        let mut members = Vec::new();
        if let Some(member) = member_from(&raw, &config_dir, &config_path)? {
            members.push(member);
        }
        for dir in workspace_dirs(raw.workspace.as_ref(), &config_path)? {
            let member_dir = config_dir.join(dir);
            let Some(member_config) = paths::CONFIG_FILE_NAMES
                .iter()
                .map(|name| member_dir.join(name))
                .find(|p| p.is_file())
            else {
                return Err(invalid_config(
                    &config_path,
                    &format!("workspace member {} has no config file", member_dir.display()),
                ));
            };
            let member_raw = read_config(&member_config)?;
            if let Some(member) = member_from(&member_raw, &member_dir, &member_config)? {
                members.push(member);
            }
        }

        Ok(Self {
            config_path: Some(config_path),
            import_map,
            lock_path,
            members,
        })
    }

    /// Find the member whose name prefixes `specifier` (`name` or `name/sub`),
    /// returning it with the matching export key.
    #[must_use]
    pub fn member_for(&self, specifier: &str) -> Option<(&WorkspaceMember, String)> {
        self.members.iter().find_map(|member| {
            let rest = specifier.strip_prefix(member.name.as_str())?;
            let rest = match rest.strip_prefix('@') {
                // A version constraint on a local member is ignored.
                Some(versioned) => versioned.find('/').map_or("", |i| &versioned[i..]),
                None => rest,
            };
            if rest.is_empty() {
                Some((member, ".".to_string()))
            } else if rest.starts_with('/') {
                Some((member, format!(".{rest}")))
            } else {
                None
            }
        })
    }
}

fn read_config(path: &Path) -> Result<RawConfig> {
    let text = fs::read_to_string(path).map_err(|e| LoaderError::fs("read", path, &e))?;
    let value = jsonc_parser::parse_to_serde_value(&text, &ParseOptions::default())
        .map_err(|e| invalid_config(path, &e.to_string()))?
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(value).map_err(|e| invalid_config(path, &e.to_string()))
}

fn inline_import_map(raw: &RawConfig, config_path: &Path) -> Result<ImportMap> {
    if raw.imports.is_none() && raw.scopes.is_none() {
        return Ok(ImportMap::default());
    }
    let mut doc = serde_json::Map::new();
    if let Some(imports) = &raw.imports {
        doc.insert("imports".into(), imports.clone());
    }
    if let Some(scopes) = &raw.scopes {
        doc.insert("scopes".into(), scopes.clone());
    }
    let base = file_url(config_path)?;
    ImportMap::from_value(Value::Object(doc), &base)
}

/// Load an external import map from a path or `file:` URL.
fn load_import_map(location: &str, base_dir: &Path) -> Result<ImportMap> {
    let path = match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().map_err(|()| {
            LoaderError::new(codes::IMPORT_MAP_INVALID, format!("Invalid import map URL {url}"))
        })?,
        Ok(url) if url.scheme().len() > 1 => {
            return Err(LoaderError::new(
                codes::IMPORT_MAP_INVALID,
                format!("Remote import maps are not supported: {url}"),
            ));
        }
        // Single-letter "schemes" are Windows drive letters.
        _ => base_dir.join(location),
    };

    debug!(path = %path.display(), "loading import map");
    let text = fs::read_to_string(&path).map_err(|e| LoaderError::fs("read", &path, &e))?;
    ImportMap::parse(&text, &file_url(&path)?)
}

/// Interpret the `lock` setting: `false` disables, a string or `{ "path" }`
/// names the file, anything else means `deno.lock` beside the config.
fn lock_setting(lock: Option<&Value>, config_dir: &Path, config_path: &Path) -> Result<Option<PathBuf>> {
    match lock {
        None | Some(Value::Null | Value::Bool(true)) => Ok(Some(config_dir.join(paths::LOCKFILE_NAME))),
        Some(Value::Bool(false)) => Ok(None),
        Some(Value::String(path)) => Ok(Some(config_dir.join(path))),
        Some(Value::Object(obj)) => match obj.get("path").and_then(Value::as_str) {
            Some(path) => Ok(Some(config_dir.join(path))),
            None => Ok(Some(config_dir.join(paths::LOCKFILE_NAME))),
        },
        Some(other) => Err(invalid_config(
            config_path,
            &format!("unsupported \"lock\" value {other}"),
        )),
    }
}

/// Member directories from `workspace`: either an array or `{ "members": [...] }`.
fn workspace_dirs(workspace: Option<&Value>, config_path: &Path) -> Result<Vec<String>> {
    let list = match workspace {
        None => return Ok(Vec::new()),
        Some(Value::Array(list)) => list,
        Some(Value::Object(obj)) => match obj.get("members") {
            Some(Value::Array(list)) => list,
            None => return Ok(Vec::new()),
            Some(_) => return Err(invalid_config(config_path, "\"workspace.members\" must be an array")),
        },
        Some(_) => return Err(invalid_config(config_path, "\"workspace\" must be an array")),
    };

    list.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| invalid_config(config_path, "workspace entries must be strings"))
        })
        .collect()
}

/// A config with a `name` and `exports` describes a local package.
fn member_from(raw: &RawConfig, dir: &Path, config_path: &Path) -> Result<Option<WorkspaceMember>> {
    let (Some(name), Some(exports)) = (&raw.name, &raw.exports) else {
        return Ok(None);
    };

    let exports = match exports {
        Value::String(target) => BTreeMap::from([(".".to_string(), target.clone())]),
        Value::Object(obj) => obj
            .iter()
            .map(|(key, target)| {
                target
                    .as_str()
                    .map(|t| (key.clone(), t.to_string()))
                    .ok_or_else(|| invalid_config(config_path, &format!("export '{key}' must be a string")))
            })
            .collect::<Result<_>>()?,
        _ => return Err(invalid_config(config_path, "\"exports\" must be a string or object")),
    };

    Ok(Some(WorkspaceMember {
        name: name.clone(),
        version: raw.version.clone(),
        dir: dir.to_path_buf(),
        exports,
    }))
}

fn file_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path).map_err(|()| {
        LoaderError::new(
            codes::CONFIG_INVALID,
            format!("Cannot convert {} to a file URL", path.display()),
        )
    })
}

fn invalid_config(path: &Path, msg: &str) -> LoaderError {
    LoaderError::new(
        codes::CONFIG_INVALID,
        format!("Invalid config file {}: {msg}", path.display()),
    )
}
