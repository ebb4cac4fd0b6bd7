//! JSON response bodies returned by every route.
//!
//! Timestamps are captured when the envelope is built, not when the request
//! arrived, and always render as UTC ISO-8601 with a `Z` suffix.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorCode;

/// Current UTC time, e.g. `2026-10-19T08:15:02.123456Z`.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Success body for `/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub request_id: String,
    pub success: bool,
    pub analysis: String,
    pub tokens_used: u64,
    pub processing_time_ms: u64,
    pub timestamp: String,
}

impl AnalyzeResponse {
    pub fn new(request_id: &str, analysis: String, tokens_used: u64, processing_time_ms: u64) -> Self {
        Self {
            request_id: request_id.to_owned(),
            success: true,
            analysis,
            tokens_used,
            processing_time_ms,
            timestamp: timestamp(),
        }
    }
}

/// Success body for `/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub request_id: String,
    pub success: bool,
    pub content: String,
    pub tokens_used: u64,
    /// Serialized as `null` when the provider did not say why it stopped.
    pub finish_reason: Option<String>,
    pub processing_time_ms: u64,
    pub timestamp: String,
}

impl ChatResponse {
    pub fn new(
        request_id: &str,
        content: String,
        tokens_used: u64,
        finish_reason: Option<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            request_id: request_id.to_owned(),
            success: true,
            content,
            tokens_used,
            finish_reason,
            processing_time_ms,
            timestamp: timestamp(),
        }
    }
}

/// Failure body shared by every route.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub request_id: String,
    pub success: bool,
    pub error_code: ErrorCode,
    pub error_message: String,
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: String,
}

impl ErrorEnvelope {
    pub fn new(request_id: &str, code: ErrorCode, message: &str, details: Option<Value>) -> Self {
        Self {
            request_id: request_id.to_owned(),
            success: false,
            error_code: code,
            error_message: message.to_owned(),
            recoverable: code.recoverable(),
            details,
            timestamp: timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_is_utc_with_z_suffix() {
        let ts = timestamp();
        assert!(ts.ends_with('Z'), "got: {ts}");
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok(), "got: {ts}");
    }

    #[test]
    fn analyze_response_serializes_success_shape() {
        let json = serde_json::to_value(AnalyzeResponse::new("t1", "AI is...".into(), 42, 7)).unwrap();
        assert_eq!(json["request_id"], "t1");
        assert_eq!(json["success"], true);
        assert_eq!(json["analysis"], "AI is...");
        assert_eq!(json["tokens_used"], 42);
        assert_eq!(json["processing_time_ms"], 7);
        assert!(json.get("finish_reason").is_none());
    }

    #[test]
    fn chat_response_keeps_null_finish_reason() {
        let json = serde_json::to_value(ChatResponse::new("c1", "hi".into(), 0, None, 1)).unwrap();
        assert_eq!(json["content"], "hi");
        assert_eq!(json["finish_reason"], Value::Null);
    }

    #[test]
    fn error_envelope_derives_recoverable_from_code() {
        let env = ErrorEnvelope::new(
            "e1",
            ErrorCode::ServerError,
            "boom",
            Some(json!({ "k": 1 })),
        );
        let json = serde_json::to_value(env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "SERVER_ERROR");
        assert_eq!(json["recoverable"], true);
        assert_eq!(json["details"]["k"], 1);
    }
}
