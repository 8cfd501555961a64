//! # Health Check Handler
//!
//! Simple endpoint to check if the server is running.
//! Used by load balancers and monitoring systems.

use crate::state::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// Health check endpoint
///
/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// {
///   "status": "healthy",
///   "service": "passkey-ceremony",
///   "backend": "sqlite"
/// }
/// ```
///
/// Never fails, so it returns `Json<Value>` directly.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "passkey-ceremony",
        "backend": state.orchestrator.stores().backend(),
    }))
}
