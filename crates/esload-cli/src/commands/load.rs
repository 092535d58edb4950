//! `esload load` command implementation.
//!
//! Resolves a specifier and loads it the way a bundler plugin would:
//! ES modules are read or fetched, npm packages are materialized.

use super::{fail, runtime, LoaderArgs};
use esload_core::{LoadedModule, LoaderError, ResolvedModule};
use miette::Result;
use std::io::{self, Write};
use std::path::PathBuf;

enum Outcome {
    Module(LoadedModule),
    NpmPath(PathBuf),
    NotLoaded(ResolvedModule),
}

/// Run the load command.
pub fn run(
    args: &LoaderArgs,
    specifier: &str,
    referrer: Option<&str>,
    print: bool,
    json: bool,
) -> Result<()> {
    let referrer = args.referrer(referrer)?;

    let result: Result<Option<Outcome>, LoaderError> = runtime()?.block_on(async {
        let loader = args.loader()?;
        let Some(resolved) = loader
            .resolve(specifier, referrer.as_ref(), Some(&args.cwd))
            .await?
        else {
            return Ok(None);
        };

        let outcome = match &resolved {
            ResolvedModule::Esm { specifier } => Outcome::Module(loader.load_esm(specifier).await?),
            ResolvedModule::Npm { .. } => Outcome::NpmPath(loader.npm_path(&resolved).await?),
            ResolvedModule::Node { .. } | ResolvedModule::External { .. } => {
                Outcome::NotLoaded(resolved)
            }
        };
        Ok(Some(outcome))
    });

    let outcome = match result {
        Ok(Some(outcome)) => outcome,
        Ok(None) => {
            return fail(
                LoaderError::new(
                    esload_core::error::codes::SPECIFIER_INVALID,
                    format!("Cannot resolve '{specifier}'"),
                ),
                json,
            )
        }
        Err(e) => return fail(e, json),
    };

    match outcome {
        Outcome::Module(module) => print_module(&module, print, json),
        Outcome::NpmPath(path) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "kind": "npm", "path": path })
                );
            } else {
                println!("{}", path.display());
            }
            Ok(())
        }
        Outcome::NotLoaded(resolved) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "ok": true, "loaded": false, "resolved": resolved })
                );
            } else {
                println!("{} (not loaded)", super::resolve::describe(&resolved));
            }
            Ok(())
        }
    }
}

fn print_module(module: &LoadedModule, print: bool, json: bool) -> Result<()> {
    if json {
        let mut value = serde_json::json!({
            "ok": true,
            "kind": "esm",
            "specifier": module.specifier.as_str(),
            "media_type": module.media_type,
            "loader": module.loader,
            "size": module.contents.len(),
        });
        if print {
            value["contents"] = String::from_utf8_lossy(&module.contents).into();
        }
        println!("{value}");
        return Ok(());
    }

    println!("{}", module.specifier);
    println!("  media type: {}", module.media_type);
    println!("  loader:     {}", module.loader);
    println!("  size:       {} bytes", module.contents.len());
    if print {
        println!();
        io::stdout()
            .lock()
            .write_all(&module.contents)
            .map_err(|e| miette::miette!("Failed to write output: {e}"))?;
    }
    Ok(())
}
