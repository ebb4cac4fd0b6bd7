//! Client-facing routes: the endpoints the automation client talks to.
//!
//! This is intentionally a thin layer: all request semantics live in
//! [`crate::bridge`]. Handlers pull the guarded body and request id out of the
//! request extensions and turn the outcome into a JSON envelope.

use std::sync::Arc;

use axum::{
    extract::State,
    handler::Handler as _,
    http::{Method, Uri},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};

use crate::{
    api::guard::{json_body_guard, JsonBody, RequestId},
    bridge::{self, AnalyzeRequest, BridgeState, ChatRequest},
    envelope::{AnalyzeResponse, ChatResponse},
    error::{ApiError, ErrorCode, UNKNOWN_REQUEST_ID},
};

/// Build the bridge router.
///
/// The body guard wraps the POST handlers only, so `/health` and the
/// method-not-allowed fallback never buffer a body.
pub fn router(state: Arc<BridgeState>) -> Router {
    let guard = middleware::from_fn_with_state(Arc::clone(&state), json_body_guard);
    Router::new()
        .route("/analyze", post(analyze.layer(guard.clone())))
        .route("/chat", post(chat.layer(guard)))
        .route("/health", get(crate::api::health::health))
        .fallback(unrouted)
        .method_not_allowed_fallback(unrouted)
        .with_state(state)
}

/// `POST /analyze`: free-form analysis over `query` and/or `sources`.
pub async fn analyze(
    State(state): State<Arc<BridgeState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Extension(JsonBody(body)): Extension<JsonBody>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let req: AnalyzeRequest = bridge::decode_fields(&request_id, body)?;
    Ok(Json(bridge::analyze(&state, &request_id, req).await?))
}

/// `POST /chat`: structured multi-turn completion over `messages`.
pub async fn chat(
    State(state): State<Arc<BridgeState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Extension(JsonBody(body)): Extension<JsonBody>,
) -> Result<Json<ChatResponse>, ApiError> {
    let req: ChatRequest = bridge::decode_fields(&request_id, body)?;
    Ok(Json(bridge::chat(&state, &request_id, req).await?))
}

/// Anything the router does not match, by path or by method.
///
/// Reported inside the fixed error taxonomy as an uncaught failure, so clients
/// switching on `error_code` never see a code outside it.
async fn unrouted(method: Method, uri: Uri) -> ApiError {
    tracing::warn!(%method, path = uri.path(), "no route");
    ApiError::new(
        UNKNOWN_REQUEST_ID,
        ErrorCode::InternalError,
        format!("No route for {method} {}", uri.path()),
    )
}
