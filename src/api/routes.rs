//! HTTP route assembly and shared application state.

use std::sync::Arc;

use axum::{response::Json, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::{pipeline as pipeline_api, records};
use crate::config::Config;
use crate::dify::{DifyClient, WorkflowRunner};
use crate::store::{create_record_store, RecordStore};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Record store (single source of truth for task records)
    pub store: Box<dyn RecordStore>,
    /// Workflow transport
    pub runner: Box<dyn WorkflowRunner>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = create_record_store(config.store, config.data_dir.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize record store: {}", e))?;
    if store.is_persistent() {
        tracing::info!("Record store: sqlite at {}", config.data_dir.display());
    } else {
        tracing::warn!("Record store: in-memory; records will not survive a restart");
    }

    let runner: Box<dyn WorkflowRunner> = Box::new(DifyClient::new(
        &config.dify.base_url,
        &config.dify.user,
        config.dify.timeout,
    )?);

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        config,
        store,
        runner,
    });

    let app = Router::new()
        .route("/api/health", get(health))
        .nest("/api/records", records::routes())
        .nest("/api/pipeline", pipeline_api::routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
