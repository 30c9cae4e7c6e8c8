use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::snapshot::SnapshotManifest;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use ohno::IntoAppError;
use std::fs::{self, File};
use std::io::Write;
use tokio_util::sync::CancellationToken;

const LOG_TARGET: &str = "  download";

#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Repository URL, e.g. `https://github.com/owner/name/tree/main`
    #[arg(value_name = "REPO_URL")]
    pub repo_url: String,

    /// Where to write the archive (default is `<name>-<revision>.zip` in the current directory)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn download_archive<H: Host>(host: &mut H, args: &DownloadArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let reference = common.engine.parse_reference(&args.repo_url).into_app_err("invalid repository URL")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let result: Result<(Utf8PathBuf, SnapshotManifest)> = async {
        let mut prepared = common
            .engine
            .stream(reference, cancel.clone())
            .await
            .into_app_err_with(|| format!("listing '{}'", args.repo_url))?;

        let output = args.output.clone().unwrap_or_else(|| Utf8PathBuf::from(prepared.archive_name()));
        let _ = writeln!(
            host.output(),
            "Downloading {} file(s) from {} into {output}",
            prepared.file_count,
            prepared.reference
        );

        let mut file = File::create(&output).into_app_err_with(|| format!("creating '{output}'"))?;

        let written: Result<SnapshotManifest> = async {
            while let Some(chunk) = prepared.next_chunk().await {
                let chunk = chunk.into_app_err("building archive")?;
                file.write_all(&chunk).into_app_err_with(|| format!("writing '{output}'"))?;
            }
            file.flush().into_app_err_with(|| format!("writing '{output}'"))?;
            prepared.finish().await.into_app_err("building archive")
        }
        .await;

        match written {
            Ok(manifest) => Ok((output, manifest)),
            Err(e) => {
                drop(file);
                remove_partial(&output);
                Err(e)
            }
        }
    }
    .await;

    watcher.abort();
    let (output, manifest) = result?;
    report(host, &output, &manifest);
    Ok(())
}

fn remove_partial(output: &Utf8Path) {
    if let Err(e) = fs::remove_file(output) {
        log::warn!(target: LOG_TARGET, "Could not remove incomplete archive '{output}': {e}");
    }
}

fn report<H: Host>(host: &mut H, output: &Utf8Path, manifest: &SnapshotManifest) {
    let _ = writeln!(
        host.output(),
        "Wrote {output}: {} of {} file(s) archived",
        manifest.succeeded,
        manifest.total
    );

    if manifest.is_complete() {
        return;
    }

    let mut err = host.error();
    let _ = writeln!(err, "{} file(s) could not be fetched:", manifest.failed.len());
    for failed in &manifest.failed {
        let _ = writeln!(err, "  {}: {}", failed.path, failed.detail);
    }
}
