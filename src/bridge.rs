//! Request handling core: validation, prompt assembly and the provider call.
//!
//! Each request is independent: the only shared value is [`BridgeState`],
//! which is built once at startup and never mutated.

use std::{sync::Arc, time::Instant};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::{
    config::Config,
    envelope::{AnalyzeResponse, ChatResponse},
    error::ApiError,
    provider::{ChatMessage, OpenAIClient},
};

/// Instruction appended to every `/analyze` prompt.
pub const ANALYZE_INSTRUCTION: &str =
    "Please analyze the above content and provide a comprehensive research summary.";

/// Shared application state injected into every request handler via [`axum::extract::State`].
pub struct BridgeState {
    pub config: Arc<Config>,
    pub provider: OpenAIClient,
    /// Presence of a credential at startup. Never checked against the provider.
    pub api_key_configured: bool,
}

impl BridgeState {
    /// Resolve secrets from the environment and build the provider client.
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let api_key = config.openai.api_key();
        let org_id = config.openai.org_id();
        Self::with_credentials(config, api_key.as_deref(), org_id.as_deref())
    }

    /// Like [`BridgeState::new`] with explicit credentials instead of env lookups.
    pub fn with_credentials(
        config: Arc<Config>,
        api_key: Option<&str>,
        org_id: Option<&str>,
    ) -> anyhow::Result<Self> {
        let provider = OpenAIClient::new(&config.openai, api_key, org_id)?;
        Ok(Self {
            config,
            provider,
            api_key_configured: api_key.is_some(),
        })
    }
}

/// Body of `POST /analyze`.
#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub sources: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Body of `POST /chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// Decode endpoint fields from an already-parsed JSON object.
///
/// A field of the wrong type is a validation failure tied to `request_id`.
pub fn decode_fields<T>(request_id: &str, body: Map<String, Value>) -> Result<T, ApiError>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::validation(request_id, format!("Invalid request field: {e}")))
}

/// Assemble the `/analyze` input text.
///
/// Section order and labels are fixed so identical requests yield identical
/// prompts. Empty sections are skipped.
pub fn build_prompt(query: Option<&str>, sources: Option<&str>) -> String {
    let mut prompt = String::new();
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        prompt.push_str("Research Query: ");
        prompt.push_str(query);
        prompt.push_str("\n\n");
    }
    if let Some(sources) = sources.filter(|s| !s.is_empty()) {
        prompt.push_str("Source Content:\n");
        prompt.push_str(sources);
        prompt.push_str("\n\n");
    }
    prompt.push_str(ANALYZE_INSTRUCTION);
    prompt
}

/// Run a free-form analysis over a query and/or source content.
#[tracing::instrument(skip(state, req), fields(model = tracing::field::Empty))]
pub async fn analyze(
    state: &BridgeState,
    request_id: &str,
    req: AnalyzeRequest,
) -> Result<AnalyzeResponse, ApiError> {
    let query = req.query.as_deref().filter(|q| !q.is_empty());
    let sources = req.sources.as_deref().filter(|s| !s.is_empty());
    if query.is_none() && sources.is_none() {
        tracing::warn!(request_id, "missing query and sources");
        return Err(ApiError::validation(
            request_id,
            "At least one of 'query' or 'sources' is required",
        ));
    }

    let model = req
        .model
        .as_deref()
        .unwrap_or(&state.config.openai.default_model);
    let max_tokens = req
        .max_tokens
        .unwrap_or(state.config.openai.default_max_tokens);
    tracing::Span::current().record("model", model);

    let input = build_prompt(query, sources);
    let content_length = input.chars().count();
    info!(request_id, model, content_length, "analyze request");

    let started = Instant::now();
    let completion = state
        .provider
        .create_response(model, &input, max_tokens)
        .await
        .map_err(|e| ApiError::from_provider(request_id, e))?;
    let time_ms = elapsed_ms(started);

    info!(request_id, tokens = completion.tokens_used, time_ms, "analyze completed");
    Ok(AnalyzeResponse::new(
        request_id,
        completion.text,
        completion.tokens_used,
        time_ms,
    ))
}

/// Run a structured chat completion over the client's message list.
#[tracing::instrument(skip(state, req), fields(model = tracing::field::Empty))]
pub async fn chat(
    state: &BridgeState,
    request_id: &str,
    req: ChatRequest,
) -> Result<ChatResponse, ApiError> {
    let messages = match req.messages {
        Some(messages) if !messages.is_empty() => messages,
        _ => {
            tracing::warn!(request_id, "missing messages");
            return Err(ApiError::validation(
                request_id,
                "'messages' array is required",
            ));
        }
    };

    let model = req
        .model
        .as_deref()
        .unwrap_or(&state.config.openai.default_model);
    let max_tokens = req
        .max_tokens
        .unwrap_or(state.config.openai.default_max_tokens);
    tracing::Span::current().record("model", model);
    info!(request_id, model, messages = messages.len(), "chat request");

    let started = Instant::now();
    let completion = state
        .provider
        .chat_completion(model, &messages, max_tokens)
        .await
        .map_err(|e| ApiError::from_provider(request_id, e))?;
    let time_ms = elapsed_ms(started);

    info!(request_id, tokens = completion.tokens_used, time_ms, "chat completed");
    Ok(ChatResponse::new(
        request_id,
        completion.text,
        completion.tokens_used,
        completion.finish_reason,
        time_ms,
    ))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
