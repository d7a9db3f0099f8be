//! The seam between Dossier and a generative-text service.

use std::sync::Arc;

use serde_json::Value;

use dossier_shared::{DossierError, Result};

use crate::message::ChatRequest;

/// Name and JSON schema of a record requested via native structured output.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema<'a> {
    pub name: &'a str,
    pub schema: &'a Value,
}

/// A synchronous generative backend.
///
/// Implementations map transport failures onto [`DossierError`] so the retry
/// client can tell rate limits apart from everything else:
/// - throttling becomes [`DossierError::RateLimited`]
/// - a refused schema becomes [`DossierError::SchemaRejected`]
pub trait ChatBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Free-text completion.
    fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Whether [`complete_structured`](Self::complete_structured) is usable.
    fn supports_structured_output(&self) -> bool {
        false
    }

    /// Schema-constrained completion returning the decoded JSON value.
    fn complete_structured(&self, _request: &ChatRequest, schema: OutputSchema<'_>) -> Result<Value> {
        Err(DossierError::SchemaRejected(format!(
            "backend '{}' has no native structured output (schema '{}')",
            self.name(),
            schema.name
        )))
    }
}

macro_rules! forward_backend {
    ($wrapper:ident) => {
        impl<B: ChatBackend + ?Sized> ChatBackend for $wrapper<B> {
            fn name(&self) -> &str {
                (**self).name()
            }

            fn complete(&self, request: &ChatRequest) -> Result<String> {
                (**self).complete(request)
            }

            fn supports_structured_output(&self) -> bool {
                (**self).supports_structured_output()
            }

            fn complete_structured(
                &self,
                request: &ChatRequest,
                schema: OutputSchema<'_>,
            ) -> Result<Value> {
                (**self).complete_structured(request, schema)
            }
        }
    };
}

forward_backend!(Box);
forward_backend!(Arc);
