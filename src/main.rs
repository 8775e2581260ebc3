use clap::Parser;
use dotenvy::dotenv;
use rinvo_backend::config::RelayConfig;
use rinvo_backend::infrastructure::{staging, upstream};
use rinvo_backend::services::worker::StagingWorker;
use rinvo_backend::{AppState, create_app};
use std::net::SocketAddr;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rinvo_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    info!("🚀 Starting RINVO conversion relay...");
    info!(
        "🛡️  Relay Config: Max Size={}MB, Retention={:?}, API key configured={}",
        config.max_file_size / 1024 / 1024,
        config.staging_retention,
        config.api_key_configured()
    );

    // 2. Staging area (directory + startup sweep) and upstream client
    let staging_store = staging::setup_staging(&config).await?;
    let client = upstream::setup_client(&config)?;

    // 3. Background sweep and deferred deletions
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = StagingWorker::new(staging_store.clone(), &config, shutdown_rx);
    let worker_handle = tokio::spawn(worker.run());

    // 4. API server
    let port = config.port;
    let state = AppState::new(config, staging_store, client);
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✅ API Server listening on: http://0.0.0.0:{}", port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Stop the worker once in-flight requests are done
    info!("🛑 Shutting down relay services...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!("❌ Staging worker ended abnormally: {}", e);
    }

    info!("👋 Relay exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
