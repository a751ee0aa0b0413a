//! REST API server for Referent.
//!
//! Provides HTTP endpoints for:
//! - Meeting creation and participant management
//! - Consent confirmation
//! - Chunked audio upload and finalization
//! - Processing status and document download
//! - Share link creation and anonymous access

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{extract::DefaultBodyLimit, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use crate::db::Database;
use crate::ingest::ChunkStore;
use crate::pipeline::ProcessingOrchestrator;
use crate::share::ShareTokenIssuer;
use crate::storage::Storage;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub storage: Storage,
    pub chunks: Arc<ChunkStore>,
    pub orchestrator: Arc<ProcessingOrchestrator>,
    pub shares: Arc<ShareTokenIssuer>,
    pub demo_retention_hours: i64,
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .merge(routes::meetings::router(state.clone()))
            .merge(routes::shares::router(state))
            // Chunk uploads plus multipart framing overhead.
            .layer(DefaultBodyLimit::max(12 * 1024 * 1024))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self) -> Result<()> {
        let app = Self::router(self.state);

        let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", self.port)).await?;

        info!("API server listening on http://0.0.0.0:{}", self.port);
        info!("Endpoints:");
        info!("  GET  /                               - Service info");
        info!("  GET  /version                        - Version info");
        info!("  POST /meetings                       - Create meeting");
        info!("  POST /meetings/:id/participants      - Add participants");
        info!("  POST /meetings/:id/consent           - Confirm recording consent");
        info!("  POST /meetings/:id/upload            - Upload audio chunk");
        info!("  POST /meetings/:id/finalize          - Assemble and start processing");
        info!("  GET  /meetings/:id/status            - Processing status");
        info!("  GET  /meetings/:id/download/:doc     - Download generated PDF");
        info!("  POST /meetings/:id/share             - Create share link");
        info!("  GET  /share/:token                   - View shared documents");
        info!("  GET  /share/:token/download/:doc     - Download shared PDF");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "referent",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "referent"
    }))
}
