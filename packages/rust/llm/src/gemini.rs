//! Backend that shells out to the `gemini` command-line tool.
//!
//! The flattened conversation is written to the child's stdin and the tool is
//! asked for JSON output (`-o json`). Replies are either `{"response": ...}` or
//! plain text.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use dossier_shared::{DossierError, LlmConfig, Result};

use crate::backend::ChatBackend;
use crate::message::ChatRequest;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs one `gemini -o json` process per request.
#[derive(Debug, Clone)]
pub struct GeminiCliBackend {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl GeminiCliBackend {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args: vec!["-o".into(), "json".into()],
            timeout,
        }
    }

    pub fn from_llm_config(config: &LlmConfig) -> Self {
        Self::new(&config.gemini_command, Duration::from_secs(config.timeout_secs))
    }

    /// Replace the default `-o json` arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn run(&self, prompt: &str) -> Result<String> {
        info!(command = %self.command, prompt_chars = prompt.len(), "calling gemini cli");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DossierError::Subprocess(format!(
                    "failed to spawn `{}`: {e}. Is it installed?",
                    self.command
                ))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DossierError::Subprocess("failed to capture gemini stdin".into()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DossierError::Subprocess("failed to capture gemini stdout".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DossierError::Subprocess("failed to capture gemini stderr".into()))?;

        // Pipes are drained on their own threads so a chatty child cannot block.
        let prompt = prompt.to_owned();
        let writer = thread::spawn(move || {
            let _ = stdin.write_all(prompt.as_bytes());
        });
        let out_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });
        let err_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    error!(timeout_secs = self.timeout.as_secs(), "gemini cli timed out");
                    return Err(DossierError::Subprocess(format!(
                        "gemini cli timeout after {}s",
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    return Err(DossierError::Subprocess(format!("failed to wait on gemini: {e}")));
                }
            }
        };

        let _ = writer.join();
        let stdout = out_reader.join().unwrap_or_default();
        let stderr = err_reader.join().unwrap_or_default();

        info!(code = ?status.code(), "gemini cli returned");
        if !status.success() {
            error!(stderr = %stderr.trim(), "gemini cli failed");
            return Err(DossierError::Subprocess(format!(
                "gemini cli failed: {}",
                stderr.trim()
            )));
        }

        let reply = parse_reply(&stdout);
        debug!(chars = reply.len(), "gemini reply parsed");
        Ok(reply)
    }
}

impl ChatBackend for GeminiCliBackend {
    fn name(&self) -> &str {
        "gemini-cli"
    }

    fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.run(&request.flatten())
    }
}

/// Pull `response` out of the tool's JSON envelope, or fall back to raw stdout.
fn parse_reply(stdout: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(stdout) {
        Ok(serde_json::Value::Object(map)) => map
            .get("response")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        _ => stdout.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_envelope_is_unwrapped() {
        assert_eq!(parse_reply(r#"{"response": "SAFE", "stats": {}}"#), "SAFE");
        assert_eq!(parse_reply(r#"{"stats": {}}"#), "");
    }

    #[test]
    fn raw_stdout_is_trimmed() {
        assert_eq!(parse_reply("  UNSAFE: gambling\n"), "UNSAFE: gambling");
    }

    #[test]
    fn missing_binary_is_subprocess_error() {
        let backend = GeminiCliBackend::new(
            "dossier-definitely-not-a-real-binary",
            Duration::from_secs(1),
        );
        let err = backend.complete(&ChatRequest::prompt("s", "u")).unwrap_err();
        assert!(matches!(err, DossierError::Subprocess(_)));
    }

    #[cfg(unix)]
    #[test]
    fn stdin_is_echoed_through_cat() {
        let backend = GeminiCliBackend::new("cat", Duration::from_secs(5)).with_args(Vec::<String>::new());
        let reply = backend
            .complete(&ChatRequest::prompt("line one", "line two"))
            .expect("cat reply");
        assert_eq!(reply, "line one\nline two");
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_times_out() {
        let backend = GeminiCliBackend::new("sleep", Duration::from_millis(200)).with_args(["5"]);
        let err = backend.complete(&ChatRequest::new()).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
