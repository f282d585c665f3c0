//! POST /collect-data

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use mauth_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::parse_trace;
use crate::db::sessions::save_training_session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /collect-data request
#[derive(Debug, Deserialize)]
pub struct CollectRequest {
    pub user_id: Option<i64>,
    #[serde(default)]
    pub sequences: Vec<Value>,
}

/// POST /collect-data response
#[derive(Debug, Serialize)]
pub struct CollectResponse {
    pub status: &'static str,
    pub session_id: Uuid,
}

/// POST /collect-data
///
/// Store labeled training traces for one user. Every trace is validated before
/// anything is written; the session is all-or-nothing.
pub async fn collect_data(
    State(state): State<AppState>,
    payload: Result<Json<CollectRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CollectResponse>)> {
    let Json(request) = payload?;

    let user_id = request
        .user_id
        .map(UserId)
        .ok_or_else(|| ApiError::BadRequest("user_id is required".to_string()))?;
    if request.sequences.is_empty() {
        return Err(ApiError::BadRequest(
            "sequences must contain at least one trace".to_string(),
        ));
    }

    let traces = request
        .sequences
        .iter()
        .enumerate()
        .map(|(i, value)| parse_trace(value, &format!("sequences[{}]", i)))
        .collect::<ApiResult<Vec<_>>>()?;

    let session_id = save_training_session(&state.db, user_id, &traces).await?;
    info!(
        user_id = %user_id,
        sequences = traces.len(),
        session_id = %session_id,
        "Training data collected"
    );

    Ok((
        StatusCode::CREATED,
        Json(CollectResponse {
            status: "success",
            session_id,
        }),
    ))
}

/// Build training data collection routes
pub fn collect_routes() -> Router<AppState> {
    Router::new().route("/collect-data", post(collect_data))
}
