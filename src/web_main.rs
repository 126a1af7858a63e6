//! WebSocket entry point for Vibe Editor
//!
//! Runs the backend without the desktop shell, for browser builds of the UI.

use anyhow::Context;
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use vibe_editor_lib::{transport, Backend, BackendConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Vibe Editor backend over WebSocket", long_about = None)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind")]
    host: String,

    #[arg(long, default_value_t = 8421, help = "Port to bind")]
    port: u16,

    #[arg(long, value_name = "PATH", help = "Backend configuration file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Serve the built UI from this directory")]
    dist: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = BackendConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let backend = Arc::new(Backend::new(config).await.context("starting backend")?);

    let listener = tokio::net::TcpListener::bind((cli.host.as_str(), cli.port))
        .await
        .with_context(|| format!("binding {}:{}", cli.host, cli.port))?;

    let router = transport::router(Arc::clone(&backend), cli.dist.as_deref());
    transport::serve(listener, router, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    })
    .await
    .context("serving")?;

    backend.shutdown();
    Ok(())
}
