//! Local and workspace specifier resolution.
//!
//! Turns a specifier plus its importer context into an absolute URL, using
//! the workspace import map and local workspace members. Classification of
//! the resulting URL happens in [`crate::loader`].

mod config_file;
mod esbuild;
mod import_map;

pub use config_file::{WorkspaceConfig, WorkspaceMember};
pub use esbuild::{esbuild_resolution_to_url, url_to_esbuild_resolution, EsbuildResolution};
pub use self::import_map::{is_relative, ImportMap};

use crate::config::LoaderOptions;
use crate::error::{codes, LoaderError, Result};
use crate::specifier::parse_jsr_specifier;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;
use url::Url;

/// Resolves specifiers against the workspace model, loading it on first use.
#[derive(Debug)]
pub struct WorkspaceResolver {
    options: LoaderOptions,
    workspace: Mutex<Option<Arc<WorkspaceConfig>>>,
}

impl WorkspaceResolver {
    #[must_use]
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            options,
            workspace: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The workspace model, loaded once until [`reset`](Self::reset).
    ///
    /// # Errors
    /// Returns an error if the config file or import map cannot be loaded.
    pub fn workspace(&self) -> Result<Arc<WorkspaceConfig>> {
        let mut slot = self.workspace.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(workspace) = slot.as_ref() {
            return Ok(Arc::clone(workspace));
        }
        let workspace = Arc::new(WorkspaceConfig::load(&self.options)?);
        *slot = Some(Arc::clone(&workspace));
        Ok(workspace)
    }

    /// Drop the workspace model. The next resolution reloads it.
    pub fn reset(&self) {
        *self.workspace.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Resolve `specifier` to an absolute URL.
    ///
    /// Import map entries apply first. Relative specifiers resolve against
    /// `referrer`, or against `resolve_dir` when there is no referrer.
    /// Absolute URLs pass through. Bare specifiers naming a workspace member
    /// resolve to the member's files.
    ///
    /// Returns `Ok(None)` when the specifier cannot be resolved here: a
    /// relative specifier without any importer context, or an unmapped bare
    /// specifier.
    ///
    /// # Errors
    /// Returns an error if the workspace cannot be loaded or a workspace
    /// member does not export the requested path.
    pub fn resolve(
        &self,
        specifier: &str,
        referrer: Option<&Url>,
        resolve_dir: Option<&Path>,
    ) -> Result<Option<Url>> {
        let workspace = self.workspace()?;
        let base = match referrer {
            Some(referrer) => Some(referrer.clone()),
            None => resolve_dir.and_then(|dir| self.dir_url(dir)),
        };

        if let Some(mapped) = workspace.import_map.resolve(specifier, base.as_ref())? {
            trace!(specifier, resolved = %mapped, "import map");
            return self.resolve_members(&workspace, mapped).map(Some);
        }

        if is_relative(specifier) {
            let Some(base) = base else {
                return Ok(None);
            };
            let url = base.join(specifier).map_err(|e| {
                LoaderError::new(
                    codes::SPECIFIER_INVALID,
                    format!("Cannot resolve '{specifier}' from {base}: {e}"),
                )
            })?;
            return Ok(Some(url));
        }

        if let Ok(url) = Url::parse(specifier) {
            // Single-letter schemes are Windows drive letters, not URLs.
            if url.scheme().len() > 1 {
                return self.resolve_members(&workspace, url).map(Some);
            }
        }

        match workspace.member_for(specifier) {
            Some((member, export)) => member_export(member, &export).map(Some),
            None => Ok(None),
        }
    }

    /// Replace a `jsr:` URL naming a local workspace member with its file URL.
    fn resolve_members(&self, workspace: &WorkspaceConfig, url: Url) -> Result<Url> {
        if url.scheme() != "jsr" {
            return Ok(url);
        }
        let package = parse_jsr_specifier(&url)?;
        let Some(member) = workspace.members.iter().find(|m| m.name == package.name) else {
            return Ok(url);
        };
        let export = package
            .path
            .as_deref()
            .map_or_else(|| ".".to_string(), |p| format!(".{p}"));
        member_export(member, &export)
    }

    fn dir_url(&self, dir: &Path) -> Option<Url> {
        if dir.is_absolute() {
            Url::from_directory_path(dir).ok()
        } else {
            Url::from_directory_path(self.options.cwd.join(dir)).ok()
        }
    }
}

fn member_export(member: &WorkspaceMember, export: &str) -> Result<Url> {
    member.export_url(export).ok_or_else(|| {
        LoaderError::new(
            codes::JSR_EXPORT_MISSING,
            format!(
                "Workspace package '{}' does not export '{export}'",
                member.name
            ),
        )
    })
}
