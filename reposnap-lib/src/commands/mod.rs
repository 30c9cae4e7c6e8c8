//! Command-line interface for reposnap
//!
//! # Commands
//!
//! - **serve**: Run the HTTP service exposing the snapshot engine
//! - **list**: Print the file tree of a repository snapshot
//! - **download**: Write a repository snapshot to a local zip archive
//! - **init**: Generate a default configuration file
//!
//! The `run` function parses command-line arguments using clap and routes to the
//! matching handler. Provider-facing commands share `CommonArgs`, which selects the
//! configuration file and log level; `common` turns them into a ready-to-use
//! [`Snapshotter`](crate::snapshot::Snapshotter).
//!
//! Configuration is a TOML file (`reposnap.toml` by default) covering the provider
//! endpoints, the concurrency limit, the retry policy, and the service address.

mod common;
mod config;
mod download;
mod host;
mod init;
mod list;
mod run;
mod serve;

pub use config::Config;
pub use download::{DownloadArgs, download_archive};
pub use host::Host;
pub use init::{InitArgs, init_config};
pub use list::{ListArgs, list_tree};
pub use run::run;
pub use serve::{ServeArgs, serve_http};
