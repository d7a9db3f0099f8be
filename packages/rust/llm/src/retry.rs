//! Rate-limit-aware invocation client.
//!
//! Every generative call in Dossier goes through [`ResilientClient`]. A call
//! that fails with a recognized rate-limit condition is retried after a wait
//! derived from the error (explicit hint) or from exponential backoff.
//! Any other failure is returned to the caller untouched.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use dossier_shared::{DossierError, Result, RetryPolicy};

use crate::backend::{ChatBackend, OutputSchema};
use crate::message::ChatRequest;

const REQUEST_LOG_CHARS: usize = 500;
const RESPONSE_LOG_CHARS: usize = 1000;

static TRY_AGAIN_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"try again in (\d+(?:\.\d+)?)s").expect("valid regex"));

static RETRY_AFTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"retry.?after[:\s]+(\d+)").expect("valid regex"));

type Sleeper = Box<dyn Fn(Duration) + Send + Sync>;

/// Synchronous retrying wrapper around a [`ChatBackend`].
pub struct ResilientClient {
    backend: Box<dyn ChatBackend>,
    policy: RetryPolicy,
    sleeper: Sleeper,
    log_payloads: bool,
}

impl ResilientClient {
    pub fn new(backend: impl ChatBackend + 'static, policy: RetryPolicy) -> Self {
        Self {
            backend: Box::new(backend),
            policy,
            sleeper: Box::new(std::thread::sleep),
            log_payloads: false,
        }
    }

    /// Replace the blocking sleep, e.g. to record waits in tests.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Log truncated request/response payloads at debug level.
    pub fn with_payload_logging(mut self, enabled: bool) -> Self {
        self.log_payloads = enabled;
        self
    }

    pub fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Free-text completion with rate-limit retry.
    pub fn invoke(&self, request: &ChatRequest) -> Result<String> {
        self.log_request(request);
        let reply = self.with_retry(|| self.backend.complete(request))?;
        self.log_response(&reply);
        Ok(reply)
    }

    /// Native schema-constrained completion with rate-limit retry.
    pub fn invoke_structured(&self, request: &ChatRequest, schema: OutputSchema<'_>) -> Result<Value> {
        self.log_request(request);
        let value = self.with_retry(|| self.backend.complete_structured(request, schema))?;
        if self.log_payloads {
            self.log_response(&value.to_string());
        }
        Ok(value)
    }

    fn with_retry<T>(&self, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut previous_wait: Option<Duration> = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match call() {
                Ok(value) => return Ok(value),
                Err(err) if is_rate_limited(&err) => err,
                Err(err) => return Err(err),
            };

            if attempt >= max_attempts {
                warn!(
                    backend = self.backend.name(),
                    attempts = attempt,
                    "rate limit retries exhausted"
                );
                return Err(DossierError::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                });
            }

            let wait = next_wait(&self.policy, previous_wait, explicit_delay(&err));
            warn!(
                backend = self.backend.name(),
                attempt,
                max_attempts,
                wait_secs = wait.as_secs_f64(),
                "rate limited, backing off"
            );
            (self.sleeper)(wait);
            previous_wait = Some(wait);
        }
    }

    fn log_request(&self, request: &ChatRequest) {
        if !self.log_payloads {
            return;
        }
        debug!(backend = self.backend.name(), messages = request.messages.len(), "request");
        for (i, message) in request.messages.iter().enumerate() {
            debug!(
                index = i,
                role = message.role.as_str(),
                content = %truncate_chars(&message.content, REQUEST_LOG_CHARS),
                "request message"
            );
        }
    }

    fn log_response(&self, reply: &str) {
        if self.log_payloads {
            debug!(
                backend = self.backend.name(),
                content = %truncate_chars(reply, RESPONSE_LOG_CHARS),
                "response"
            );
        }
    }
}

/// Whether an error is a rate-limit condition worth retrying.
///
/// Decoding, schema, config and local I/O failures never are, whatever their
/// text says. Other errors qualify when a 429 / "too many requests" token
/// comes with a mention of the rate, or when they carry a retry phrase.
pub fn is_rate_limited(err: &DossierError) -> bool {
    match err {
        DossierError::RateLimited { .. } => true,
        DossierError::RetriesExhausted { .. }
        | DossierError::DecodingFailed(_)
        | DossierError::SchemaRejected(_)
        | DossierError::Config { .. }
        | DossierError::Io { .. }
        | DossierError::Validation { .. } => false,
        other => {
            let text = other.to_string().to_lowercase();
            let status_token = text.contains("429") || text.contains("too many requests");
            (status_token && text.contains("rate"))
                || text.contains("rate limit")
                || TRY_AGAIN_IN.is_match(&text)
                || RETRY_AFTER.is_match(&text)
        }
    }
}

/// An explicit delay advertised by the error, if any.
///
/// `"try again in 2.5s"` waits 3 s; `"retry after 7"` waits 7 s.
pub fn explicit_delay(err: &DossierError) -> Option<Duration> {
    if let DossierError::RateLimited {
        retry_after: Some(delay),
        ..
    } = err
    {
        return Some(*delay);
    }

    let text = err.to_string().to_lowercase();
    if let Some(secs) = TRY_AGAIN_IN
        .captures(&text)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        return Some(Duration::from_secs(secs.floor() as u64 + 1));
    }
    RETRY_AFTER
        .captures(&text)
        .and_then(|c| c[1].parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Wait before the next attempt: the hint if present, otherwise base then doubling.
pub fn next_wait(policy: &RetryPolicy, previous: Option<Duration>, hint: Option<Duration>) -> Duration {
    let wait = match (hint, previous) {
        (Some(hint), _) => hint,
        (None, None) => policy.base_delay,
        (None, Some(previous)) => previous.saturating_mul(2),
    };
    wait.min(policy.max_delay)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::scripted::ScriptedBackend;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            max_attempts: 10,
        }
    }

    fn recording_client(backend: ScriptedBackend, policy: RetryPolicy) -> (ResilientClient, Arc<Mutex<Vec<Duration>>>) {
        let waits = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&waits);
        let client = ResilientClient::new(backend, policy)
            .with_sleeper(move |d| sink.lock().expect("waits lock").push(d));
        (client, waits)
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_secs).collect()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut replies: Vec<Result<String>> = (0..6)
            .map(|_| Err(DossierError::rate_limited("429 Too Many Requests")))
            .collect();
        replies.push(Ok("done".into()));
        let (client, waits) = recording_client(ScriptedBackend::replies(replies), policy());

        let reply = client.invoke(&ChatRequest::prompt("s", "u")).expect("eventually succeeds");
        assert_eq!(reply, "done");
        assert_eq!(*waits.lock().expect("waits"), secs(&[5, 10, 20, 40, 80, 120]));
    }

    #[test]
    fn explicit_hint_wins_and_is_capped() {
        let replies = vec![
            Err(DossierError::Network("Rate limit reached. Please try again in 2.5s.".into())),
            Err(DossierError::RateLimited {
                message: "slow down".into(),
                retry_after: Some(Duration::from_secs(600)),
            }),
            Ok("ok".into()),
        ];
        let (client, waits) = recording_client(ScriptedBackend::replies(replies), policy());

        client.invoke(&ChatRequest::new()).expect("success");
        assert_eq!(*waits.lock().expect("waits"), secs(&[3, 120]));
    }

    #[test]
    fn doubling_continues_from_hinted_wait() {
        let replies = vec![
            Err(DossierError::Network("429: retry after 7".into())),
            Err(DossierError::rate_limited("too many requests")),
            Ok("ok".into()),
        ];
        let (client, waits) = recording_client(ScriptedBackend::replies(replies), policy());

        client.invoke(&ChatRequest::new()).expect("success");
        assert_eq!(*waits.lock().expect("waits"), secs(&[7, 14]));
    }

    #[test]
    fn exhaustion_stops_after_max_attempts() {
        let backend = ScriptedBackend::from_fn(|_| Err(DossierError::rate_limited("429")));
        let limited = RetryPolicy {
            max_attempts: 3,
            ..policy()
        };
        let (client, waits) = recording_client(backend, limited);

        let err = client.invoke(&ChatRequest::new()).unwrap_err();
        assert!(matches!(err, DossierError::RetriesExhausted { attempts: 3, .. }));
        // No pointless sleep after the final attempt.
        assert_eq!(*waits.lock().expect("waits"), secs(&[5, 10]));
    }

    #[test]
    fn other_errors_propagate_immediately() {
        let backend = ScriptedBackend::replies([Err(DossierError::Api {
            status: 500,
            message: "boom".into(),
        })]);
        let (client, waits) = recording_client(backend, policy());

        let err = client.invoke(&ChatRequest::new()).unwrap_err();
        assert!(matches!(err, DossierError::Api { status: 500, .. }));
        assert!(waits.lock().expect("waits").is_empty());
    }

    #[test]
    fn rate_limit_detection_by_text() {
        assert!(is_rate_limited(&DossierError::Network("HTTP 429: rate limited".into())));
        assert!(is_rate_limited(&DossierError::Api {
            status: 503,
            message: "Too Many Requests, slow your request rate".into()
        }));
        assert!(is_rate_limited(&DossierError::Network("Rate limit exceeded".into())));
        assert!(is_rate_limited(&DossierError::Subprocess("quota hit, retry after 30".into())));
        assert!(!is_rate_limited(&DossierError::Network("HTTP 429".into())));
        assert!(!is_rate_limited(&DossierError::decoding("expected value at line 1")));
        assert!(!is_rate_limited(&DossierError::decoding(
            "rate limit mentioned inside a quoted reply, try again in 2s"
        )));
        assert!(!is_rate_limited(&DossierError::SchemaRejected(
            "429 rate limit schema".into()
        )));
        assert!(!is_rate_limited(&DossierError::RetriesExhausted {
            attempts: 10,
            last: "429".into()
        }));
    }

    #[test]
    fn decoding_failures_are_not_retried() {
        let backend = ScriptedBackend::replies([
            Err(DossierError::decoding(
                "malformed completion body: trailing characters at line 1 column 429",
            )),
            Ok("second".to_string()),
        ]);
        let (client, waits) = recording_client(backend, policy());

        let err = client.invoke(&ChatRequest::new()).unwrap_err();
        assert!(matches!(err, DossierError::DecodingFailed(_)));
        assert!(waits.lock().expect("waits").is_empty());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("àèìòù", 2), "àè");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
