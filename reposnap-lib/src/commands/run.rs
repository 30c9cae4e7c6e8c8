//! Command dispatch logic for reposnap

use super::{DownloadArgs, InitArgs, ListArgs, ServeArgs, download_archive, init_config, list_tree, serve_http};
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "reposnap", author, version, long_about = None)]
#[command(about = "Browse public repositories and download them as zip archives")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve(Box<ServeArgs>),
    /// Print the file tree of a repository
    List(Box<ListArgs>),
    /// Download a repository as a zip archive
    Download(Box<DownloadArgs>),
    /// Generate a default configuration file
    Init(InitArgs),
}

/// Dispatch command-line arguments to the appropriate handler
///
/// This function parses the command-line arguments and executes the corresponding
/// subcommand. It's designed to be called from main.rs with the program arguments.
///
/// # Arguments
///
/// * `args` - An iterator of command-line arguments (typically from `std::env::args()`)
///
/// # Errors
///
/// Returns an error if command parsing fails or if the executed command fails
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    match &Cli::parse_from(args).command {
        Command::Serve(serve_args) => serve_http(host, serve_args).await,
        Command::List(list_args) => list_tree(host, list_args).await,
        Command::Download(download_args) => download_archive(host, download_args).await,
        Command::Init(init_args) => init_config(host, init_args),
    }
}
