//! POST /train-model

use axum::{extract::State, routing::post, Json, Router};
use mauth_core::assemble;
use serde::Serialize;
use tracing::info;

use crate::db::sessions::load_training_traces;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /train-model response
#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub status: &'static str,
    /// Accuracy on the held-out partition
    pub test_accuracy: f64,
    pub model_version: u64,
}

/// POST /train-model
///
/// Retrain from every stored training trace. Fitting runs on the blocking
/// pool; a request arriving while another run is in progress gets 409.
pub async fn train_model(State(state): State<AppState>) -> ApiResult<Json<TrainResponse>> {
    let traces = load_training_traces(&state.db).await?;
    info!(traces = traces.len(), "Training requested");

    let trainer = state.trainer.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let corpus = assemble(&traces)?;
        trainer.try_train(&corpus)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Training task failed: {}", e)))??;

    Ok(Json(TrainResponse {
        status: "success",
        test_accuracy: outcome.held_out_accuracy,
        model_version: outcome.artifact.version,
    }))
}

/// Build training routes
pub fn train_routes() -> Router<AppState> {
    Router::new().route("/train-model", post(train_model))
}
