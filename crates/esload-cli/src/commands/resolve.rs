//! `esload resolve` command implementation.

use super::{fail, runtime, LoaderArgs};
use esload_core::ResolvedModule;
use miette::Result;

/// Run the resolve command.
pub fn run(args: &LoaderArgs, specifier: &str, referrer: Option<&str>, json: bool) -> Result<()> {
    let referrer = args.referrer(referrer)?;

    let result = runtime()?.block_on(async {
        let loader = args.loader()?;
        loader
            .resolve(specifier, referrer.as_ref(), Some(&args.cwd))
            .await
    });

    let resolved = match result {
        Ok(resolved) => resolved,
        Err(e) => return fail(e, json),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "specifier": specifier,
                "resolved": resolved,
            })
        );
        return Ok(());
    }

    match resolved {
        Some(resolved) => println!("{}", describe(&resolved)),
        None => {
            eprintln!("error: cannot resolve '{specifier}'");
            eprintln!("hint: bare specifiers need an import map entry or a workspace member");
            std::process::exit(1);
        }
    }
    Ok(())
}

/// One-line human description of a resolution.
pub fn describe(resolved: &ResolvedModule) -> String {
    match resolved {
        ResolvedModule::Esm { specifier } => specifier.to_string(),
        ResolvedModule::Npm {
            package_id, path, ..
        } => format!("npm {package_id}{}", path.as_deref().unwrap_or("")),
        ResolvedModule::Node { path } => format!("node:{path}"),
        ResolvedModule::External { specifier } => format!("external {specifier}"),
    }
}
