//! Liveness probe.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{bridge::BridgeState, envelope::timestamp};

/// `GET /health`: always 200 while the process is up.
///
/// `openai_configured` only reports whether a key was present at startup; the
/// provider is never contacted, so this is safe as a container liveness probe.
pub async fn health(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "openai_configured": state.api_key_configured,
            "timestamp": timestamp(),
        })),
    )
}
