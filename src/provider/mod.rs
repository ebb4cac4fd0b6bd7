//! The external completion provider, seen through a narrow contract.
//!
//! A call either yields a [`Completion`] or fails with exactly one
//! [`ProviderError`] kind. The variants form a closed set so the HTTP layer
//! can map every failure onto the bridge's error envelope exhaustively.

pub mod openai;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use openai::OpenAIClient;

/// Text produced by a single provider call, plus the metadata the bridge reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// `usage.total_tokens`, or 0 when the provider omitted usage.
    pub tokens_used: u64,
    /// Only populated by the chat call shape.
    pub finish_reason: Option<String>,
}

/// One turn of a conversation, forwarded to the provider as-is.
///
/// Only the object shape is enforced. `content` may be a string, an array of
/// typed parts, or `null` alongside `tool_calls`; every key is passed through
/// verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ChatMessage(pub Map<String, Value>);

#[cfg(test)]
impl ChatMessage {
    pub fn new(role: &str, content: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert("role".into(), Value::from(role));
        fields.insert("content".into(), content.into());
        Self(fields)
    }
}

/// Failure kinds a provider call can end in.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider rejected the credential (HTTP 401).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The provider throttled the call (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimited {
        /// Seconds from the `Retry-After` header, when the provider sent one.
        retry_after: Option<u64>,
        message: String,
    },

    /// The transport gave up waiting for the provider.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other provider-side failure: non-2xx status or connection error.
    #[error("{0}")]
    Api(String),

    /// The call "succeeded" but the bridge could not make sense of the result.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}
