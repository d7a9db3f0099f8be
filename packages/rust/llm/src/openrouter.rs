//! OpenRouter chat-completions backend.
//!
//! Speaks the OpenAI-compatible `/chat/completions` API with bearer auth.
//! Native structured output uses `response_format: {type: "json_schema"}`.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use dossier_shared::{DossierError, LlmConfig, Result};

use crate::backend::{ChatBackend, OutputSchema};
use crate::message::{ChatMessage, ChatRequest};

/// Connection settings for [`OpenRouterBackend`].
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenRouterConfig {
    /// Build from the `[llm]` section, reading the key from `api_key_env`.
    pub fn from_llm_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                DossierError::config(format!("{} is not set", config.api_key_env))
            })?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Blocking OpenRouter client.
///
/// Owns a `reqwest::blocking::Client`, so it must be created and dropped
/// outside of an async context.
pub struct OpenRouterBackend {
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterBackend {
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DossierError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn send(&self, request: &ChatRequest, response_format: Option<Value>) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = RequestBody {
            model: &self.config.model,
            messages: &request.messages,
            temperature: self.config.temperature,
            response_format,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("X-Title", "dossier")
            .json(&body)
            .send()
            .map_err(|e| DossierError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let retry_after = parse_retry_after_header(response.headers());
        let text = response
            .text()
            .map_err(|e| DossierError::Network(format!("{url}: {e}")))?;

        if !status.is_success() {
            return Err(map_status_error(status, retry_after, text));
        }

        let parsed: ResponseBody = serde_json::from_str(&text)
            .map_err(|e| DossierError::decoding(format!("malformed completion body: {e}")))?;

        // OpenRouter relays some upstream failures inside a 200 body.
        if let Some(error) = parsed.error {
            let code = error.code.as_ref().and_then(Value::as_u64).unwrap_or(500);
            let status = StatusCode::from_u16(code as u16).unwrap_or(StatusCode::BAD_GATEWAY);
            return Err(map_status_error(status, None, error.message));
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        debug!(model = %self.config.model, chars = content.len(), "completion received");
        Ok(content)
    }
}

impl ChatBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.send(request, None)
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn complete_structured(&self, request: &ChatRequest, schema: OutputSchema<'_>) -> Result<Value> {
        let format = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "strict": true,
                "schema": schema.schema,
            },
        });
        let content = self.send(request, Some(format))?;
        serde_json::from_str(content.trim()).map_err(|e| {
            DossierError::decoding(format!("structured reply is not JSON ({e}): {content}"))
        })
    }
}

fn parse_retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_secs(secs.ceil() as u64))
}

fn map_status_error(status: StatusCode, retry_after: Option<Duration>, text: String) -> DossierError {
    let lowered = text.to_lowercase();
    match status {
        StatusCode::TOO_MANY_REQUESTS => DossierError::RateLimited {
            message: format!("429 Too Many Requests: {text}"),
            retry_after,
        },
        StatusCode::BAD_REQUEST
            if lowered.contains("response_format") || lowered.contains("schema") =>
        {
            DossierError::SchemaRejected(text)
        }
        _ => DossierError::Api {
            status: status.as_u16(),
            message: text,
        },
    }
}
