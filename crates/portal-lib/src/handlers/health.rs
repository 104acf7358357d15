// ============================
// crates/portal-lib/src/handlers/health.rs
// ============================
//! Liveness of the portal and its admin API.
use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::SharedState;

/// `GET /healthz`
pub async fn healthz(State(state): State<SharedState>) -> Result<Json<Value>, AppError> {
    state.auth.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}
