//! `esload npm-dir` command implementation.

use super::{fail, runtime, LoaderArgs};
use esload_core::error::codes;
use esload_core::{LoaderError, ResolvedModule};
use miette::Result;

/// Run the npm-dir command.
pub fn run(args: &LoaderArgs, specifier: &str, json: bool) -> Result<()> {
    let result = runtime()?.block_on(async {
        let loader = args.loader()?;
        let resolved = loader.resolve(specifier, None, Some(&args.cwd)).await?;
        let Some(resolved) = resolved.filter(|r| matches!(r, ResolvedModule::Npm { .. })) else {
            return Err(LoaderError::new(
                codes::SPECIFIER_INVALID,
                format!("'{specifier}' does not resolve to an npm package"),
            ));
        };
        let path = loader.npm_path(&resolved).await?;
        Ok((resolved, path))
    });

    let (resolved, path) = match result {
        Ok(found) => found,
        Err(e) => return fail(e, json),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "resolved": resolved,
                "path": path,
            })
        );
    } else {
        println!("{}", path.display());
    }
    Ok(())
}
