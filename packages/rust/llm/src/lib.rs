//! Generative backends and the resilient invocation layer.
//!
//! - [`ChatBackend`]: the backend seam, with OpenRouter and Gemini CLI implementations
//! - [`ResilientClient`]: rate-limit retry with exponential backoff
//! - [`StructuredDecoder`]: native structured output with a JSON-prompting fallback

pub mod backend;
pub mod gemini;
pub mod message;
pub mod openrouter;
pub mod retry;
pub mod scripted;
pub mod structured;

pub use backend::{ChatBackend, OutputSchema};
pub use gemini::GeminiCliBackend;
pub use message::{ChatMessage, ChatRequest, MessageRole};
pub use openrouter::{OpenRouterBackend, OpenRouterConfig};
pub use retry::ResilientClient;
pub use scripted::ScriptedBackend;
pub use structured::{StructuredDecoder, extract_json};

use dossier_shared::{LlmConfig, Provider, Result};
use tracing::info;

/// Build the backend selected by `[llm].provider`.
pub fn backend_from_config(config: &LlmConfig) -> Result<Box<dyn ChatBackend>> {
    match config.provider {
        Provider::Openrouter => {
            let backend = OpenRouterBackend::new(OpenRouterConfig::from_llm_config(config)?)?;
            info!(model = %backend.model(), "using OpenRouter as LLM provider");
            Ok(Box::new(backend))
        }
        Provider::GeminiCli => {
            info!(command = %config.gemini_command, "using Gemini CLI as LLM provider");
            Ok(Box::new(GeminiCliBackend::from_llm_config(config)))
        }
    }
}
