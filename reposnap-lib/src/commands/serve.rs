use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::server::{self, AppState};
use clap::Parser;
use core::net::SocketAddr;
use ohno::IntoAppError;
use std::io::Write;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides `listen` from the configuration file)
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn serve_http<H: Host>(host: &mut H, args: &ServeArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let addr = args.listen.unwrap_or(common.config.listen);

    let listener = TcpListener::bind(addr).await.into_app_err_with(|| format!("binding to {addr}"))?;
    let local = listener.local_addr().into_app_err("reading listener address")?;
    let _ = writeln!(host.output(), "Serving on http://{local} (press Ctrl-C to stop)");

    server::serve(listener, AppState::new(common.engine), shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Unable to listen for Ctrl-C, the server must be stopped another way: {e}");
        core::future::pending::<()>().await;
    }
}
