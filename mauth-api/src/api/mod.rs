//! HTTP API handlers for mauth-api

pub mod buildinfo;
pub mod collect;
pub mod health;
pub mod train;
pub mod verify;

pub use collect::collect_routes;
pub use health::health_routes;
pub use train::train_routes;
pub use verify::verify_routes;

use mauth_core::{extract_checked, MovementTrace};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Parse one wire-format trace, naming `field` in the error.
///
/// Traces whose signature would not be finite are rejected here so they never
/// reach storage.
pub(crate) fn parse_trace(value: &Value, field: &str) -> ApiResult<MovementTrace> {
    MovementTrace::from_json(value)
        .and_then(|trace| extract_checked(&trace).map(|_| trace))
        .map_err(|e| ApiError::BadRequest(format!("{}: {}", field, e)))
}
