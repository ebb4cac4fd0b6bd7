//! Body guard middleware for the JSON routes.
//!
//! Runs before `/analyze` and `/chat` and short-circuits with an error
//! envelope when the body cannot be used:
//!
//! - larger than `server.max_content_length` → 413 `PAYLOAD_TOO_LARGE`
//! - empty, not JSON, or not a JSON object → 400 `VALIDATION_ERROR`
//!
//! Both carry `request_id = "unknown"` since no id could be read yet.
//!
//! On success the request gets a [`RequestId`] (from the body's `request_id`,
//! or `auto-<unix-seconds>`) and the parsed [`JsonBody`] as extensions. The id
//! is fixed here, once, so every path through the handler reports the same
//! one. It is also echoed in the `X-Request-ID` response header and attached
//! to a [`tracing`] span around the handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt as _, LengthLimitError, Limited};
use serde_json::{Map, Value};
use tracing::Instrument as _;

use crate::{
    bridge::BridgeState,
    error::{ApiError, UNKNOWN_REQUEST_ID},
};

/// Request id assigned by [`json_body_guard`].
///
/// Handlers read it with `Extension(RequestId(id))`.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// The request body, already parsed into a JSON object.
#[derive(Clone, Debug)]
pub struct JsonBody(pub Map<String, Value>);

/// Axum middleware that buffers, size-checks and parses the request body.
pub async fn json_body_guard(
    State(state): State<Arc<BridgeState>>,
    req: Request,
    next: Next,
) -> Response {
    let limit = state.config.server.max_content_length;
    let (parts, body) = req.into_parts();

    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            tracing::warn!(limit, "request body over size limit");
            return ApiError::payload_too_large(limit).into_response();
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return ApiError::validation(UNKNOWN_REQUEST_ID, "Request body could not be read")
                .into_response();
        }
    };

    let object = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::warn!(bytes = bytes.len(), "request body is not a JSON object");
            return ApiError::validation(UNKNOWN_REQUEST_ID, "Request must be JSON")
                .into_response();
        }
    };

    let id = request_id_for(&object);

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(RequestId(id.clone()));
    req.extensions_mut().insert(JsonBody(object));

    let span = tracing::info_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}

/// The client's `request_id` (strings as-is, numbers rendered), or a
/// generated `auto-<unix-seconds>`.
fn request_id_for(body: &Map<String, Value>) -> String {
    match body.get("request_id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("auto-{}", chrono::Utc::now().timestamp()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        http::StatusCode,
        middleware,
        routing::post,
        Extension, Router,
    };
    use serde_json::json;
    use tower::ServiceExt;

    use crate::config::Config;

    fn guarded_app(limit: usize) -> Router {
        let mut config = Config::default();
        config.server.max_content_length = limit;
        let state = Arc::new(
            BridgeState::with_credentials(Arc::new(config), None, None).unwrap(),
        );

        async fn echo(
            Extension(RequestId(id)): Extension<RequestId>,
            Extension(JsonBody(body)): Extension<JsonBody>,
        ) -> axum::Json<Value> {
            axum::Json(json!({ "id": id, "keys": body.len() }))
        }

        Router::new()
            .route("/echo", post(echo))
            .route_layer(middleware::from_fn_with_state(state, json_body_guard))
    }

    fn post_raw(body: impl Into<Body>) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn passes_parsed_body_and_client_request_id_through() {
        let resp = guarded_app(1024)
            .oneshot(post_raw(r#"{"request_id":"bp-1","query":"q"}"#))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["x-request-id"], "bp-1");
        let json = body_json(resp).await;
        assert_eq!(json["id"], "bp-1");
        assert_eq!(json["keys"], 2);
    }

    #[tokio::test]
    async fn generates_auto_request_id_when_absent() {
        let resp = guarded_app(1024)
            .oneshot(post_raw(r#"{"query":"q"}"#))
            .await
            .unwrap();

        let header = resp.headers()["x-request-id"].to_str().unwrap().to_owned();
        let json = body_json(resp).await;
        let id = json["id"].as_str().unwrap();
        let digits = id.strip_prefix("auto-").expect("auto- prefix");
        assert!(digits.parse::<i64>().is_ok(), "got: {id}");
        assert_eq!(header, id);
    }

    #[tokio::test]
    async fn numeric_request_id_is_rendered_as_string() {
        let resp = guarded_app(1024)
            .oneshot(post_raw(r#"{"request_id":12345}"#))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["id"], "12345");
    }

    #[tokio::test]
    async fn rejects_non_json_with_unknown_request_id() {
        let resp = guarded_app(1024).oneshot(post_raw("not json")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error_code"], "VALIDATION_ERROR");
        assert_eq!(json["request_id"], "unknown");
        assert_eq!(json["success"], false);
    }

    #[tokio::test]
    async fn rejects_empty_body() {
        let resp = guarded_app(1024).oneshot(post_raw(Body::empty())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error_code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn rejects_json_that_is_not_an_object() {
        let resp = guarded_app(1024).oneshot(post_raw("[1,2,3]")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_oversized_body_before_parsing() {
        let big = format!(r#"{{"query":"{}"}}"#, "x".repeat(200));
        let resp = guarded_app(64).oneshot(post_raw(big)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(resp).await;
        assert_eq!(json["error_code"], "PAYLOAD_TOO_LARGE");
        assert_eq!(json["request_id"], "unknown");
        assert_eq!(json["recoverable"], false);
    }

    #[tokio::test]
    async fn oversized_non_json_is_still_payload_too_large() {
        let resp = guarded_app(8).oneshot(post_raw("definitely not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
