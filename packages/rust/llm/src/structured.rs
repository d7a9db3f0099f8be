//! Two-tier structured decoding.
//!
//! Native schema-constrained decoding is tried first when the backend offers
//! it. If the backend rejects the schema, the decoder switches to a prompt
//! that demands bare JSON and extracts the object from the free-text reply.
//! The switch is permanent for the lifetime of the decoder.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use dossier_shared::{DossierError, Result, Structured};

use crate::backend::OutputSchema;
use crate::message::ChatRequest;
use crate::retry::ResilientClient;

/// Turns chat requests into typed records.
pub struct StructuredDecoder {
    client: Arc<ResilientClient>,
    native: AtomicBool,
}

impl StructuredDecoder {
    pub fn new(client: Arc<ResilientClient>) -> Self {
        let native = client.backend().supports_structured_output();
        Self {
            client,
            native: AtomicBool::new(native),
        }
    }

    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }

    /// Whether the next decode will try native structured output.
    pub fn uses_native(&self) -> bool {
        self.native.load(Ordering::Relaxed)
    }

    /// Decode one `T` from the backend's answer to `request`.
    pub fn decode<T: Structured>(&self, request: &ChatRequest) -> Result<T> {
        let schema = T::json_schema();

        if self.uses_native() {
            let output = OutputSchema {
                name: T::NAME,
                schema: &schema,
            };
            match self.client.invoke_structured(request, output) {
                Ok(value) => return from_value(value),
                Err(err) if is_schema_incompatibility(&err) => {
                    info!(schema = T::NAME, error = %err, "native structured output refused, falling back to JSON prompting");
                    self.native.store(false, Ordering::Relaxed);
                }
                Err(err) => return Err(err),
            }
        }

        let prompted = request.clone().user(schema_instruction(&schema));
        let reply = self.client.invoke(&prompted)?;
        let value = extract_json(&reply)?;
        debug!(schema = T::NAME, "decoded via fallback prompt");
        from_value(value)
    }
}

fn from_value<T: Structured>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| DossierError::decoding(format!("reply does not match '{}': {e}", T::NAME)))
}

fn is_schema_incompatibility(err: &DossierError) -> bool {
    if matches!(err, DossierError::SchemaRejected(_)) {
        return true;
    }
    let text = err.to_string().to_lowercase();
    text.contains("invalid") && text.contains("schema")
}

/// Instruction appended to the conversation in fallback mode.
pub fn schema_instruction(schema: &Value) -> String {
    let pretty = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "Respond ONLY with valid JSON matching this schema:\n{pretty}\n\
         Do not include any prose or explanation, and do not wrap the JSON in markdown fencing."
    )
}

/// Pull a JSON object out of a free-text reply.
///
/// A fenced block's contents are preferred; the object is then taken from the
/// first `{` to the last `}`.
pub fn extract_json(reply: &str) -> Result<Value> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"```(?:json)?\s*([\s\S]*?)```").expect("valid regex")
    });

    let mut text = reply.trim();
    if let Some(caps) = FENCE_RE.captures(text) {
        if let Some(inner) = caps.get(1) {
            text = inner.as_str().trim();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            text = &text[start..=end];
        }
    }

    serde_json::from_str(text).map_err(|e| {
        DossierError::decoding(format!("no JSON object in reply ({e}): {}", preview(reply)))
    })
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
