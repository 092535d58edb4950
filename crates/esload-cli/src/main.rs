#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use esload_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "esload")]
#[command(author, version, about = "Resolve and load Deno-style module specifiers", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Workspace config file (skips deno.json discovery)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Lockfile path
    #[arg(long, global = true, value_name = "FILE")]
    lock: Option<PathBuf>,

    /// Import map file, overriding the config's importMap
    #[arg(long, global = true, value_name = "FILE")]
    import_map: Option<String>,

    /// Glob pattern for specifiers that are never loaded (repeatable)
    #[arg(long, global = true, value_name = "PATTERN")]
    external: Vec<String>,

    /// Cache root
    #[arg(long, global = true, value_name = "PATH", env = "DENO_DIR")]
    deno_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resolve a specifier and print where it points
    Resolve {
        /// The specifier (e.g. "./mod.ts", "jsr:@std/path", "npm:preact")
        specifier: String,

        /// URL or path of the importing module
        #[arg(long)]
        referrer: Option<String>,
    },

    /// Resolve and load a module, printing its media type and size
    Load {
        /// The specifier to load
        specifier: String,

        /// URL or path of the importing module
        #[arg(long)]
        referrer: Option<String>,

        /// Print the module contents
        #[arg(long)]
        print: bool,
    },

    /// Materialize an npm package and print its node_modules path
    NpmDir {
        /// An npm specifier (e.g. "npm:preact@^10.19.0/hooks")
        specifier: String,
    },

    /// Show effective paths, lockfile and registries
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .clone()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd.clone())
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json);

    logging::init(config.verbosity, config.json_logs);

    let args = commands::LoaderArgs {
        cwd: cwd.clone(),
        config: cli.config,
        lock: cli.lock,
        import_map: cli.import_map,
        external: cli.external,
        deno_dir: cli.deno_dir,
    };

    match cli.command {
        Commands::Resolve {
            specifier,
            referrer,
        } => {
            let span = tracing::info_span!("resolve", cmd = "resolve", cwd = %cwd.display());
            let _guard = span.enter();
            commands::resolve::run(&args, &specifier, referrer.as_deref(), cli.json)
        }
        Commands::Load {
            specifier,
            referrer,
            print,
        } => {
            let span = tracing::info_span!("load", cmd = "load", cwd = %cwd.display());
            let _guard = span.enter();
            commands::load::run(&args, &specifier, referrer.as_deref(), print, cli.json)
        }
        Commands::NpmDir { specifier } => {
            let span = tracing::info_span!("npm_dir", cmd = "npm-dir", cwd = %cwd.display());
            let _guard = span.enter();
            commands::npm_dir::run(&args, &specifier, cli.json)
        }
        Commands::Info => commands::info::run(&args, cli.json),
    }
}
