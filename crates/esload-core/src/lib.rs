//! esload core: module specifier resolution and remote module loading for a
//! bundler.
//!
//! The entry point is [`Loader`], which resolves `file:`, `http(s):`,
//! `data:`, `npm:`, `jsr:` and `node:` specifiers against a workspace
//! (import map, `deno.json` members, lockfile), fetches remote modules once
//! per build, and materializes npm packages into `node_modules` trees.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod fetch;
pub mod jsr;
pub mod loader;
pub mod lockfile;
pub mod media_type;
pub mod npm;
pub mod paths;
pub mod resolver;
pub mod specifier;
pub mod version;

pub use config::{Config, LoaderOptions};
pub use error::{LoaderError, Result};
pub use fetch::{FetchCache, HttpTransport, Module, Transport, TransportResponse};
pub use jsr::JsrResolver;
pub use loader::{LoadedModule, Loader, ResolvedModule};
pub use lockfile::Lockfile;
pub use media_type::MediaType;
pub use npm::{Materializer, NpmPackage, PackageInfoProvider, StaticPackageInfo};
pub use resolver::{EsbuildResolution, WorkspaceResolver};
pub use specifier::{PackageRef, Specifier};
pub use version::VERSION;
