//! Error types for Dossier.
//!
//! Library crates use [`DossierError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all Dossier operations.
#[derive(Debug, thiserror::Error)]
pub enum DossierError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error.
    #[error("network error: {0}")]
    Network(String),

    /// The generative backend answered with a non-success status.
    #[error("api error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The backend asked us to slow down. Retryable.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        /// Explicit delay advertised by the backend (e.g. `Retry-After`).
        retry_after: Option<Duration>,
    },

    /// Every attempt of a single call hit a rate limit.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The backend refused the schema used for native structured output.
    #[error("schema rejected: {0}")]
    SchemaRejected(String),

    /// Model output could not be turned into the requested record.
    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    /// A search/scrape/registry collaborator could not be reached.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A backend subprocess failed to start, timed out, or exited non-zero.
    #[error("subprocess error: {0}")]
    Subprocess(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input record, malformed field, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DossierError>;

impl DossierError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a decoding error from any displayable message.
    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::DecodingFailed(msg.into())
    }

    /// Create a rate-limit error without an explicit delay.
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after: None,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
