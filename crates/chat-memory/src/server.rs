//! Server startup and routing.
//!
//! All handlers share one `AppState`: the coordinator with its injected
//! stores, the durable database handle, and the LLM worker. The only network
//! hop is to the model backend; everything else is in-process.

use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::Config,
    memory_db::MemoryDatabase,
    shared_state::AppState,
};

/// Run the chat-memory server
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    info!("Starting chat-memory server");

    // Initialize the durable store
    let db_path = std::path::Path::new(&cfg.database_path);
    let database = match MemoryDatabase::new(db_path) {
        Ok(db) => {
            info!("History database ready at: {}", db_path.display());
            Arc::new(db)
        }
        Err(e) => {
            warn!("Failed to open history database: {}. Falling back to in-memory.", e);
            Arc::new(MemoryDatabase::new_in_memory()?)
        }
    };

    let state = AppState::new(cfg.clone(), database);

    // Start HTTP server
    info!("Starting HTTP server on {}:{}", cfg.api_host, cfg.api_port);
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", cfg.api_host, cfg.api_port)).await?;

    let app = build_router(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the serving-layer router
fn build_router(state: AppState) -> axum::Router {
    use axum::{
        Router,
        routing::{get, post},
    };
    use tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
        timeout::TimeoutLayer,
    };
    use std::time::Duration;

    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        // Streaming chat endpoints own the backup triggering contract
        .route("/chat/stream", post(crate::api::stream_api::chat_stream))
        .route("/chat/ws", get(crate::api::ws_api::chat_socket))
        // Durable history access
        .route(
            "/history/:owner_id/:session_id",
            get(crate::api::history_api::get_history)
                .delete(crate::api::history_api::delete_history),
        )
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
