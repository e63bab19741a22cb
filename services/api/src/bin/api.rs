//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, InMemoryEndpointStore, V8CodeEvaluator, WebhookGenerationAdapter},
    config::Config,
    error::ApiError,
    web::{app_router, state::AppState},
};
use genapi_core::ports::EndpointStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Endpoint Store & Run Migrations ---
    let db_adapter = match &config.database_url {
        Some(database_url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Some(db_adapter)
        }
        None => {
            warn!("DATABASE_URL is not set. Endpoints are kept in memory and lost on restart.");
            None
        }
    };
    let store: Arc<dyn EndpointStore> = match &db_adapter {
        Some(db_adapter) => db_adapter.clone(),
        None => Arc::new(InMemoryEndpointStore::new()),
    };

    // --- 3. Initialize Service Adapters ---
    let evaluator = Arc::new(V8CodeEvaluator::new(config.execution.clone()));
    let generator = Arc::new(
        WebhookGenerationAdapter::new(config.generation_webhook_url.clone(), config.webhook_timeout)
            .map_err(|e| ApiError::Internal(format!("Failed to build the webhook client: {}", e)))?,
    );
    if config.generation_webhook_url.is_none() {
        warn!("GENERATION_WEBHOOK_URL is not set. /api/submit-query will fail.");
    }

    // --- 4. Build the Shared AppState & Router ---
    let app_state = Arc::new(AppState::new(config.clone(), store, evaluator, generator));
    let app = app_router(app_state);

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let shutdown = CancellationToken::new();
    tokio::spawn(watch_for_shutdown(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    // --- 6. Release the Endpoint Store ---
    if let Some(db_adapter) = db_adapter {
        info!("Closing database connections...");
        db_adapter.close().await;
    }
    info!("Server stopped.");

    Ok(())
}

/// Cancels `token` on Ctrl-C or, on Unix, SIGTERM.
async fn watch_for_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received. Draining connections...");
    token.cancel();
}
