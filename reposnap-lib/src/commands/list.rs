use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::snapshot::EntryKind;
use clap::Parser;
use ohno::IntoAppError;
use std::io::Write;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Repository URL, e.g. `https://github.com/owner/name/tree/main`
    #[arg(value_name = "REPO_URL")]
    pub repo_url: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn list_tree<H: Host>(host: &mut H, args: &ListArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let reference = common.engine.parse_reference(&args.repo_url).into_app_err("invalid repository URL")?;

    let listing = common
        .engine
        .list(reference, &CancellationToken::new())
        .await
        .into_app_err_with(|| format!("listing '{}'", args.repo_url))?;

    let mut out = host.output();
    for entry in &listing.entries {
        let size = match entry.kind {
            EntryKind::File => entry.size.to_string(),
            EntryKind::Directory => "-".to_string(),
        };
        let kind = entry.kind.to_string();
        let _ = writeln!(out, "{kind:<9} {size:>10}  {}", entry.path);
    }

    let _ = writeln!(
        out,
        "\n{}: {} file(s), {} directories, {} bytes",
        listing.reference,
        listing.file_count(),
        listing.directory_count(),
        listing.total_bytes()
    );
    drop(out);

    if listing.truncated {
        let _ = writeln!(host.error(), "warning: the provider truncated this listing, so some files are missing");
    }

    Ok(())
}
