//! `esload info` command implementation.
//!
//! Shows the effective workspace, lockfile, cache root and registries
//! without touching the network.

use super::{fail, LoaderArgs};
use esload_core::resolver::WorkspaceConfig;
use esload_core::version::version_string;
use esload_core::Lockfile;
use miette::Result;

/// Run the info command.
pub fn run(args: &LoaderArgs, json: bool) -> Result<()> {
    let options = args.options();
    let workspace = match WorkspaceConfig::load(&options) {
        Ok(workspace) => workspace,
        Err(e) => return fail(e, json),
    };

    // A missing lockfile is normal until the first `deno install`.
    let lockfile = workspace
        .lock_path
        .as_deref()
        .filter(|p| p.is_file())
        .map(Lockfile::load)
        .transpose();
    let lockfile = match lockfile {
        Ok(lockfile) => lockfile,
        Err(e) => return fail(e, json),
    };

    if json {
        let members: Vec<_> = workspace
            .members
            .iter()
            .map(|m| {
                serde_json::json!({
                    "name": m.name,
                    "version": m.version,
                    "dir": m.dir,
                    "exports": m.exports,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "version": version_string(),
                "cwd": options.cwd,
                "config": workspace.config_path,
                "import_map": !workspace.import_map.is_empty(),
                "lockfile": {
                    "path": workspace.lock_path,
                    "version": lockfile.as_ref().map(|l| l.version.as_str()),
                },
                "members": members,
                "external": options.external,
                "deno_dir": options.deno_dir,
                "jsr_registry": options.jsr_registry.as_str(),
                "npm_registry": options.npm_registry.as_str(),
            })
        );
        return Ok(());
    }

    println!("{}", version_string());
    println!();
    println!("  cwd:          {}", options.cwd.display());
    match &workspace.config_path {
        Some(path) => println!("  config:       {}", path.display()),
        None => println!("  config:       (none)"),
    }
    println!(
        "  import map:   {}",
        if workspace.import_map.is_empty() { "no" } else { "yes" }
    );
    match (&workspace.lock_path, &lockfile) {
        (Some(path), Some(lockfile)) => {
            println!("  lockfile:     {} (v{})", path.display(), lockfile.version);
        }
        (Some(path), None) => println!("  lockfile:     {} (missing)", path.display()),
        (None, _) => println!("  lockfile:     (disabled)"),
    }
    println!("  cache:        {}", options.deno_dir.display());
    println!("  jsr registry: {}", options.jsr_registry);
    println!("  npm registry: {}", options.npm_registry);
    if !options.external.is_empty() {
        println!("  external:     {}", options.external.join(", "));
    }

    if !workspace.members.is_empty() {
        println!();
        println!("Members ({}):", workspace.members.len());
        for member in &workspace.members {
            match &member.version {
                Some(version) => println!("  {}@{version}  {}", member.name, member.dir.display()),
                None => println!("  {}  {}", member.name, member.dir.display()),
            }
        }
    }

    Ok(())
}
