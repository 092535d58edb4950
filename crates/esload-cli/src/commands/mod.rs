pub mod info;
pub mod load;
pub mod npm_dir;
pub mod resolve;

use esload_core::{HttpTransport, Loader, LoaderError, LoaderOptions};
use miette::{IntoDiagnostic, MietteDiagnostic, Report, Result};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Loader settings taken from global flags.
#[derive(Debug, Clone)]
pub struct LoaderArgs {
    pub cwd: PathBuf,
    pub config: Option<PathBuf>,
    pub lock: Option<PathBuf>,
    pub import_map: Option<String>,
    pub external: Vec<String>,
    pub deno_dir: Option<PathBuf>,
}

impl LoaderArgs {
    pub fn options(&self) -> LoaderOptions {
        let options = LoaderOptions::new(self.cwd.clone())
            .with_config_path(self.config.as_ref().map(|p| self.cwd.join(p)))
            .with_lock_path(self.lock.as_ref().map(|p| self.cwd.join(p)))
            .with_import_map(self.import_map.clone())
            .with_external(self.external.clone());
        match &self.deno_dir {
            Some(dir) => options.with_deno_dir(self.cwd.join(dir)),
            None => options,
        }
    }

    /// A loader over the real HTTP transport.
    pub fn loader(&self) -> Result<Loader, LoaderError> {
        let transport = Arc::new(HttpTransport::new()?);
        Loader::new(self.options(), transport, None)
    }

    /// Parse a `--referrer` value: a URL, or a path relative to cwd.
    pub fn referrer(&self, referrer: Option<&str>) -> Result<Option<Url>> {
        let Some(referrer) = referrer else {
            return Ok(None);
        };
        if let Ok(url) = Url::parse(referrer) {
            if url.scheme().len() > 1 {
                return Ok(Some(url));
            }
        }
        Url::from_file_path(self.cwd.join(referrer))
            .map(Some)
            .map_err(|()| miette::miette!("Invalid referrer: {referrer}"))
    }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()
}

/// Report a loader error.
///
/// In JSON mode this prints `{"ok": false, "error": {...}}` and exits with
/// status 1; otherwise it becomes a diagnostic.
pub fn fail(err: LoaderError, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "error": {
                    "code": err.code(),
                    "message": err.message(),
                }
            })
        );
        std::process::exit(1);
    }

    Err(Report::new(
        MietteDiagnostic::new(err.message().to_string()).with_code(err.code()),
    ))
}
