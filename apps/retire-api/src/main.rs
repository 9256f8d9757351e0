use std::sync::Arc;

use retire_api::logging::init_logging;
use retire_api::{router, AppConfig, AppState};
use retire_graph::GraphClient;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    init_logging(&config.log_filter);

    info!(
        listen_addr = %config.listen_addr,
        graph_endpoint = %config.endpoints.graph(),
        parallel_confirmation = config.parallel_confirmation,
        "Starting retire-api"
    );

    let listen_addr = config.listen_addr;
    let orchestrator_config = config.orchestrator_config();

    let client = match GraphClient::new(config.credentials, config.endpoints) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!("Failed to create Graph client: {e}");
            std::process::exit(1);
        }
    };

    let state = match AppState::new(client, orchestrator_config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to wire registries: {e}");
            std::process::exit(1);
        }
    };
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {listen_addr}: {e}");
            std::process::exit(1);
        }
    };

    info!(%listen_addr, "Server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
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
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    // Running confirmation polls end as Aborted instead of holding the drain.
    shutdown.cancel();
}
