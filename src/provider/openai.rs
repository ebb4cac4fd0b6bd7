//! OpenAI-compatible completion client.
//!
//! Two call shapes are supported:
//!
//! - **Responses** (`POST /v1/responses`): free-form input text, used by
//!   `/analyze`.
//! - **Chat completions** (`POST /v1/chat/completions`): an ordered message
//!   list, used by `/chat`.
//!
//! Each call is made exactly once. Transport and HTTP failures are folded into
//! [`ProviderError`] here so nothing above this module ever sees a
//! `reqwest::Error`.

use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChatMessage, Completion, ProviderError};
use crate::config::OpenAIConfig;

/// HTTP client for an OpenAI-compatible API.
///
/// Built once at startup and shared by every request; [`Client`] holds its
/// connection pool behind an `Arc`, so the struct is cheap to share and holds
/// no mutable state.
pub struct OpenAIClient {
    client: Client,
    base_url: String,
}

impl OpenAIClient {
    /// Build a client with the bearer credential and optional organization id
    /// installed as default headers.
    ///
    /// A missing key is tolerated: requests go out unauthenticated and the
    /// provider answers 401, which surfaces as an authentication failure.
    pub fn new(
        cfg: &OpenAIConfig,
        api_key: Option<&str>,
        org_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();

        if let Some(key) = api_key {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {key}"))
                    .context("invalid API key value for Authorization header")?,
            );
        }
        if let Some(org) = org_id {
            headers.insert(
                "openai-organization",
                header::HeaderValue::from_str(org)
                    .context("invalid organization id for OpenAI-Organization header")?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs_f64(cfg.timeout_secs))
            .build()
            .context("building reqwest client")?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Free-form completion over a single input string.
    pub async fn create_response(
        &self,
        model: &str,
        input: &str,
        max_output_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let body = json!({
            "model": model,
            "input": input,
            "max_output_tokens": max_output_tokens,
        });
        let text = self.post("/v1/responses", &body).await?;
        let parsed: ResponsesBody = serde_json::from_str(&text)
            .with_context(|| format!("decoding responses payload: {text}"))?;

        Ok(Completion {
            text: parsed.output_text(),
            tokens_used: parsed.usage.map_or(0, |u| u.total_tokens),
            finish_reason: None,
        })
    }

    /// Structured multi-turn completion over an ordered message list.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Completion, ProviderError> {
        let body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        let text = self.post("/v1/chat/completions", &body).await?;
        let parsed: ChatCompletionBody = serde_json::from_str(&text)
            .with_context(|| format!("decoding chat completion payload: {text}"))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("chat completion returned no choices")?;

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tokens_used: parsed.usage.map_or(0, |u| u.total_tokens),
            finish_reason: choice.finish_reason,
        })
    }

    /// POST `body` to `path` and return the raw success body.
    async fn post(&self, path: &str, body: &Value) -> Result<String, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        let retry_after = retry_after_secs(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&url, e))?;

        debug!(%url, %status, bytes = text.len(), "provider responded");

        if status.is_success() {
            return Ok(text);
        }

        let message = describe_failure(status, &text);
        Err(match status {
            StatusCode::UNAUTHORIZED => ProviderError::Authentication(message),
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                retry_after,
                message,
            },
            _ => ProviderError::Api(message),
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(format!("POST {url}: {err}"))
    } else {
        ProviderError::Api(format!("POST {url}: {err}"))
    }
}

/// Integer seconds from `Retry-After`. The HTTP-date form is not honoured.
fn retry_after_secs(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Render a failed response as `HTTP <status> (<code>): <message>`.
///
/// Prefers the provider's structured `error.message`; falls back to the raw
/// body when it is not the usual `{"error": {...}}` shape.
fn describe_failure(status: StatusCode, body: &str) -> String {
    let error = serde_json::from_str::<ErrorBody>(body).ok().map(|b| b.error);
    match error {
        Some(ErrorDetail {
            message: Some(message),
            code: Some(code),
        }) => format!("HTTP {status} ({code}): {message}"),
        Some(ErrorDetail {
            message: Some(message),
            code: None,
        }) => format!("HTTP {status}: {message}"),
        _ => format!("HTTP {status}: {}", body.trim()),
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    /// Convenience aggregate some compatible servers include.
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl ResponsesBody {
    /// Aggregate every `output_text` content part, in order.
    ///
    /// No parts yields an empty string: a reasoning model that spends its
    /// whole output budget returns only `reasoning` items.
    fn output_text(&self) -> String {
        if let Some(text) = &self.output_text {
            return text.clone();
        }
        self.output
            .iter()
            .flat_map(|item| item.content.iter().flatten())
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Option<Vec<OutputContent>>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}
