//! Error envelope for every failure the bridge reports.
//!
//! [`ApiError`] is the only error type that leaves a handler. It carries the
//! request id, an [`ErrorCode`], a client-facing summary, and optional
//! details, and renders itself as the JSON error envelope via [`IntoResponse`].
//! Full failure detail goes to the server log; the client only sees the summary.
//!
//! Provider failures are translated by [`ApiError::from_provider`], which is
//! the bridge's error taxonomy in one `match`.

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, warn};

use crate::{envelope::ErrorEnvelope, provider::ProviderError};

/// Request id used when the body could not be read far enough to find one.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Retry hint reported when a rate-limited provider does not send one.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Machine-readable failure kind. Clients branch on this and on `recoverable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    AuthError,
    RateLimit,
    Timeout,
    ContextLength,
    ServerError,
    BridgeError,
    PayloadTooLarge,
    InternalError,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            Self::ValidationError | Self::ContextLength => StatusCode::BAD_REQUEST,
            Self::AuthError => StatusCode::UNAUTHORIZED,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::ServerError => StatusCode::BAD_GATEWAY,
            Self::BridgeError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Whether the same request may succeed if retried later.
    pub fn recoverable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Timeout | Self::ServerError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::ContextLength => "CONTEXT_LENGTH",
            Self::ServerError => "SERVER_ERROR",
            Self::BridgeError => "BRIDGE_ERROR",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InternalError => "INTERNAL_ERROR",
        })
    }
}

/// A failure bound to the request it happened in.
#[derive(Debug, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub request_id: String,
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(request_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(request_id, ErrorCode::ValidationError, message)
    }

    pub fn payload_too_large(limit_bytes: usize) -> Self {
        Self::new(
            UNKNOWN_REQUEST_ID,
            ErrorCode::PayloadTooLarge,
            format!(
                "Request body exceeds maximum allowed size ({})",
                human_size(limit_bytes)
            ),
        )
    }

    pub fn internal() -> Self {
        Self::new(
            UNKNOWN_REQUEST_ID,
            ErrorCode::InternalError,
            "An unexpected error occurred",
        )
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Classify a provider failure.
    ///
    /// Precedence follows the variant order: authentication, rate limit,
    /// timeout, then generic provider errors, which are split into
    /// `CONTEXT_LENGTH` or `SERVER_ERROR` by [`is_context_length_message`].
    /// Anything else is a local `BRIDGE_ERROR`.
    pub fn from_provider(request_id: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::Authentication(detail) => {
                error!(request_id, %detail, "authentication failed");
                Self::new(request_id, ErrorCode::AuthError, "Invalid OpenAI API key")
            }
            ProviderError::RateLimited {
                retry_after,
                message,
            } => {
                let retry_after = retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                warn!(request_id, retry_after, %message, "rate limited");
                Self::new(
                    request_id,
                    ErrorCode::RateLimit,
                    format!("Rate limit exceeded. Retry after {retry_after} seconds."),
                )
                .with_details(json!({ "retry_after_seconds": retry_after }))
            }
            ProviderError::Timeout(detail) => {
                error!(request_id, %detail, "provider call timed out");
                Self::new(
                    request_id,
                    ErrorCode::Timeout,
                    "Request timed out. Try again with a shorter input.",
                )
            }
            ProviderError::Api(message) if is_context_length_message(&message) => {
                error!(request_id, %message, "context length exceeded");
                Self::new(
                    request_id,
                    ErrorCode::ContextLength,
                    "Content too large for model. Please reduce the source content size.",
                )
            }
            ProviderError::Api(message) => {
                error!(request_id, %message, "provider API error");
                Self::new(
                    request_id,
                    ErrorCode::ServerError,
                    format!("OpenAI API error: {message}"),
                )
            }
            ProviderError::Unexpected(e) => {
                error!(request_id, error = ?e, "unexpected bridge failure");
                Self::new(
                    request_id,
                    ErrorCode::BridgeError,
                    format!("Internal bridge error: {e}"),
                )
            }
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(
            &self.request_id,
            self.code,
            &self.message,
            self.details.clone(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self.envelope())).into_response()
    }
}

/// Heuristic: the provider reports context-window overflow only in free text,
/// so match on the lower-cased message. Wording changes upstream break this.
pub fn is_context_length_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("context_length") || lower.contains("maximum")
}

/// Response for a panic caught by `CatchPanicLayer`.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    error!(%detail, "unhandled panic while serving request");
    ApiError::internal().into_response()
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
