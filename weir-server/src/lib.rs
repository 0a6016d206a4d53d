//! # weir server
//!
//! HTTP API and process wiring for the weir control plane: the SQLite
//! store, the optional KServe runtime and Envoy AI Gateway adapters, and
//! the axum router on top of the core services.

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use weir_core::ports::{AiGateway, ServingRuntime};
use weir_core::{Repositories, Services, WeirConfig};
use weir_kube::{EnvoyAiGateway, KServeRuntime};
use weir_store::SqliteStore;

pub use routes::{API_BASE, router};
pub use state::AppState;

/// Open the store and connect whichever adapters are enabled.
pub async fn services_from_config(config: &WeirConfig) -> anyhow::Result<Services> {
    let store = SqliteStore::from_config(&config.database)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;

    let runtime: Option<Arc<dyn ServingRuntime>> = KServeRuntime::from_config(&config.kubernetes)
        .await
        .context("connecting to the serving runtime")?
        .map(|runtime| Arc::new(runtime) as Arc<dyn ServingRuntime>);
    let gateway: Option<Arc<dyn AiGateway>> = EnvoyAiGateway::from_config(&config.gateway)
        .await
        .context("connecting to the AI gateway")?
        .map(|gateway| Arc::new(gateway) as Arc<dyn AiGateway>);

    info!(
        serving_runtime = runtime.is_some(),
        ai_gateway = gateway.is_some(),
        "Adapters configured"
    );

    Ok(Services::new(
        Repositories::from_store(Arc::new(store)),
        runtime,
        gateway,
        &config.gateway.default_namespace,
    ))
}

/// Serve the API until Ctrl-C or SIGTERM.
pub async fn serve(config: &WeirConfig) -> anyhow::Result<()> {
    let services = services_from_config(config).await?;
    let state = AppState::new(
        services,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(address = %address, base = API_BASE, "weir listening");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("weir stopped");
    Ok(())
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
