//! Deterministic in-memory backend for tests and dry runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Value;

use dossier_shared::{DossierError, Result};

use crate::backend::{ChatBackend, OutputSchema};
use crate::message::ChatRequest;

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

/// A backend whose answers are decided by a closure or a fixed queue.
///
/// Every request is recorded so callers can assert on prompts afterwards.
pub struct ScriptedBackend {
    responder: Responder,
    native: bool,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    /// Answer every request with `responder`.
    pub fn from_fn(
        responder: impl Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            native: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer requests in order from `replies`; fails once the queue runs dry.
    pub fn replies(replies: impl IntoIterator<Item = Result<String>>) -> Self {
        let queue = Mutex::new(replies.into_iter().collect::<VecDeque<_>>());
        Self::from_fn(move |_| {
            queue
                .lock()
                .map_err(|_| DossierError::Network("scripted queue poisoned".into()))?
                .pop_front()
                .unwrap_or_else(|| Err(DossierError::Network("no scripted reply left".into())))
        })
    }

    /// Advertise native structured output; replies are parsed as JSON.
    pub fn with_native_structured(mut self) -> Self {
        self.native = true;
        self
    }

    /// Requests seen so far, in order.
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn answer(&self, request: &ChatRequest) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        (self.responder)(request)
    }
}

impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.answer(request)
    }

    fn supports_structured_output(&self) -> bool {
        self.native
    }

    fn complete_structured(&self, request: &ChatRequest, schema: OutputSchema<'_>) -> Result<Value> {
        if !self.native {
            return Err(DossierError::SchemaRejected(format!(
                "scripted backend has no native mode for '{}'",
                schema.name
            )));
        }
        let raw = self.answer(request)?;
        serde_json::from_str(&raw).map_err(|e| DossierError::decoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_is_consumed_in_order() {
        let backend = ScriptedBackend::replies([Ok("one".to_string()), Ok("two".to_string())]);
        let req = ChatRequest::prompt("s", "u");
        assert_eq!(backend.complete(&req).expect("first"), "one");
        assert_eq!(backend.complete(&req).expect("second"), "two");
        assert!(backend.complete(&req).is_err());
        assert_eq!(backend.call_count(), 3);
    }

    #[test]
    fn non_native_rejects_schema() {
        let backend = ScriptedBackend::from_fn(|_| Ok("{}".into()));
        let schema = serde_json::json!({"type": "object"});
        let err = backend
            .complete_structured(
                &ChatRequest::new(),
                OutputSchema {
                    name: "x",
                    schema: &schema,
                },
            )
            .unwrap_err();
        assert!(matches!(err, DossierError::SchemaRejected(_)));
    }
}
