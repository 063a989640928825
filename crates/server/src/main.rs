use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use curator_core::{
    create_archiver, create_authenticator, create_fetcher, create_stores, load_config,
    validate_config, BatchAllocator,
};
use curator_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CURATOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        auth = config.auth.method.as_str(),
        storage = config.storage.backend.as_str(),
        batch_size = config.batch.batch_size,
        fetch_timeout_secs = config.batch.fetch_timeout_secs,
        "Configuration loaded"
    );

    let authenticator =
        create_authenticator(&config.auth).context("Failed to create authenticator")?;
    info!("Using authenticator: {}", authenticator.method_name());

    let (counter, ledger) =
        create_stores(&config.storage).context("Failed to open batch counter and ledger")?;
    info!(counter = counter.name(), ledger = ledger.name(), "Batch stores opened");

    let fetcher = create_fetcher(
        &config.fetcher,
        &config.review.fetched_dir,
        config.batch.batch_size,
    )
    .context("Failed to create fetcher")?;
    info!("Using fetcher: {}", fetcher.name());

    let archiver = create_archiver(&config.archive).context("Failed to create archiver")?;
    info!(
        accepted = %config.archive.accepted_dir.display(),
        rejected = %config.archive.rejected_dir.display(),
        mirror = config.archive.mirror.is_some(),
        "Archiver ready"
    );

    let allocator = Arc::new(BatchAllocator::new(
        counter,
        ledger,
        fetcher,
        config.allocator_config(),
    ));
    info!(
        next_batch = %allocator.peek_next().context("Failed to read batch counter")?,
        "Allocator ready"
    );

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, authenticator, allocator, archiver));
    let app = create_router(state);

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
