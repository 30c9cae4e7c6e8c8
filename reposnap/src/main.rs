//! Browse public repositories and download them as zip archives.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use reposnap_lib::{Host, run};
use std::io::{self, Write};
use std::process::ExitCode;

/// Host bound to the process's standard streams.
#[derive(Debug, Clone, Copy, Default)]
struct ProcessHost;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Host for ProcessHost {
    fn output(&mut self) -> impl Write {
        io::stdout().lock()
    }

    fn error(&mut self) -> impl Write {
        io::stderr().lock()
    }
}

#[tokio::main]
#[cfg_attr(coverage_nightly, coverage(off))]
async fn main() -> ExitCode {
    let mut host = ProcessHost;

    match run(&mut host, std::env::args()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let _ = writeln!(host.error(), "error: {e}");
            ExitCode::FAILURE
        }
    }
}
