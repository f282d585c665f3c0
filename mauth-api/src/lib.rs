//! mauth-api library - HTTP surface for mouse-movement identity verification
//!
//! Collects labeled traces into SQLite, trains the identity model on demand
//! and verifies claimed identities against it.

pub mod api;
pub mod db;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mauth_core::{ArtifactStore, ModelTrainer, VerificationEngine};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Session and sequence storage
    pub db: SqlitePool,
    /// Current model artifact
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Serialises training runs
    pub trainer: Arc<ModelTrainer>,
    pub engine: Arc<VerificationEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            db,
            trainer: Arc::new(ModelTrainer::new(artifacts.clone())),
            engine: Arc::new(VerificationEngine::new(artifacts.clone())),
            artifacts,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::collect_routes())
        .merge(api::train_routes())
        .merge(api::verify_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
