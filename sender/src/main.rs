//! Sender binary entry point — SEND-mode side of the artifact relay.

mod fetcher;
mod http;
mod http_error;
mod pipeline;
mod state;

use anyhow::Result;
use clap::Parser;
use relay_core::config::Config;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the startup configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.port = format!(":{port}");
    }

    relay_core::logger::init(&config.log_level)?;
    tracing::info!(
        "Starting relay-sender v{} (mode: SEND)",
        env!("CARGO_PKG_VERSION")
    );

    let store = relay_core::store::from_config(&config)?;

    let state = AppState::new(config.clone(), store.clone());
    let app = http::create_router(state.clone());

    let cancel = CancellationToken::new();
    let reconciler = state
        .registry
        .clone()
        .spawn_reconciler(store.clone(), cancel.clone());
    let reaper = state.registry.clone().spawn_reaper(cancel.clone());

    let addr: SocketAddr = config.listen_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    let grace = std::time::Duration::from_secs(config.shutdown_grace_secs);
    let _ = tokio::time::timeout(grace, reconciler).await;
    let _ = tokio::time::timeout(grace, reaper).await;
    tracing::info!("Sender shut down cleanly");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
