//! Start command - run the HTTP API server.

use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use clap::Args;

use assay_server::{AppState, Server, ServerConfig};

use super::Context;

/// Arguments for the start command.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let mut config = ServerConfig::from_section(&ctx.config.server())?;
    if let Some(bind) = args.bind {
        let addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address '{bind}'"))?;
        config = config.with_bind_address(addr);
    }

    let runner = ctx.runner()?;

    if ctx.verbose {
        eprintln!("Database: {}", ctx.config.database_path().display());
        eprintln!("Results:  {}", ctx.config.results_dir().display());
        eprintln!("Steps:    {}", ctx.config.pipeline().steps_dir.display());
    }

    let server = Server::from_state(AppState::new(runner, config));
    println!("Listening on http://{}", server.bind_address());

    server.run(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
