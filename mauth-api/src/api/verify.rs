//! POST /verify-user

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use mauth_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::parse_trace;
use crate::db::sessions::record_verification_attempt;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /verify-user request
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub user_id: Option<i64>,
    pub sequence: Option<Value>,
}

/// POST /verify-user response
#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub is_authentic: bool,
    pub confidence: f64,
    pub predicted_user_id: UserId,
}

/// POST /verify-user
///
/// Verify one trace against a claimed identity, then keep the attempt for
/// audit. A failed audit write is logged and does not change the verdict.
pub async fn verify_user(
    State(state): State<AppState>,
    payload: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<Json<VerifyResponse>> {
    let Json(request) = payload?;

    let claimed = request
        .user_id
        .map(UserId)
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    let sequence = request
        .sequence
        .ok_or_else(|| ApiError::BadRequest("sequence is required".to_string()))?;
    let trace = parse_trace(&sequence, "sequence")?;

    // Artifact load reads the model file
    let engine = state.engine.clone();
    let query = trace.clone();
    let result = tokio::task::spawn_blocking(move || engine.verify(claimed, &query))
        .await
        .map_err(|e| ApiError::Internal(format!("Verification task failed: {}", e)))??;

    info!(
        claimed = %claimed,
        predicted = %result.predicted_identity,
        authentic = result.is_authentic,
        confidence = result.confidence,
        "Verification completed"
    );

    if let Err(e) = record_verification_attempt(&state.db, claimed, &trace).await {
        warn!(claimed = %claimed, error = %e, "Failed to record verification attempt");
    }

    Ok(Json(VerifyResponse {
        is_authentic: result.is_authentic,
        confidence: result.confidence,
        predicted_user_id: result.predicted_identity,
    }))
}

/// Build verification routes
pub fn verify_routes() -> Router<AppState> {
    Router::new().route("/verify-user", post(verify_user))
}
