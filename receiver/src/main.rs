//! Receiver binary entry point — RECEIVE-mode side of the artifact relay.

mod http;
mod http_error;
mod poller;
mod publisher;
mod state;

use anyhow::Result;
use clap::Parser;
use poller::ReceiverPoller;
use publisher::{is_twine_installed, ArtifactPublisher, ImagePublisher, ModelPublisher, PackagePublisher};
use relay_core::config::Config;
use state::AppState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
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
        "Starting relay-receiver v{} (mode: RECEIVE)",
        env!("CARGO_PKG_VERSION")
    );

    if config.receive_pypi.enabled && !is_twine_installed().await {
        anyhow::bail!("receive_pypi is enabled but twine is not on PATH");
    }

    let store = relay_core::store::from_config(&config)?;

    let state = AppState::new(config.clone(), store.clone());

    let mut publishers: HashMap<&'static str, Arc<dyn ArtifactPublisher>> = HashMap::new();
    if config.receive_docker.enabled {
        publishers.insert("DOCKER", Arc::new(ImagePublisher) as Arc<dyn ArtifactPublisher>);
    }
    if config.receive_pypi.enabled {
        let cfg = &config.receive_pypi;
        publishers.insert(
            "PYPI",
            Arc::new(PackagePublisher {
                nexus_repo_url: cfg.nexus_url.clone().unwrap_or_default(),
                login: cfg.login.clone().unwrap_or_default(),
                password: cfg.password.clone().unwrap_or_default(),
            }) as Arc<dyn ArtifactPublisher>,
        );
    }
    if config.receive_hf.enabled {
        let cfg = &config.receive_hf;
        publishers.insert(
            "HF",
            Arc::new(ModelPublisher {
                upload_url: cfg.nexus_url.clone().unwrap_or_default(),
                login: cfg.login.clone().unwrap_or_default(),
                password: cfg.password.clone().unwrap_or_default(),
                client: reqwest::Client::new(),
            }) as Arc<dyn ArtifactPublisher>,
        );
    }

    let poller = Arc::new(ReceiverPoller {
        state: state.clone(),
        publishers,
    });

    let http_state = http::HttpState {
        app: state.clone(),
        poller: poller.clone(),
    };
    let app = http::create_router(http_state);

    let cancel = CancellationToken::new();
    let poll_task = poller.clone().spawn(cancel.clone());
    let reaper = state.registry.clone().spawn_reaper(cancel.clone());

    let addr: SocketAddr = config.listen_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    let grace = std::time::Duration::from_secs(config.shutdown_grace_secs);
    let _ = tokio::time::timeout(grace, poll_task).await;
    let _ = tokio::time::timeout(grace, reaper).await;
    tracing::info!("Receiver shut down cleanly");

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
