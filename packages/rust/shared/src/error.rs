//! Error types for seoscope.
//!
//! Library crates use [`SeoscopeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all seoscope operations.
#[derive(Debug, thiserror::Error)]
pub enum SeoscopeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a provider or fetching a page.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// No keyword plan could be produced. Fatal to the whole run.
    #[error("planning error: {0}")]
    Planning(String),

    /// Search retrieval failed for a keyword.
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// Raw content could not be interpreted as a page.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Not enough competitor data to compare against.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// A generative-text call failed or returned unusable output.
    #[error("generation error: {0}")]
    Generation(String),

    /// A provider call did not answer within its timeout.
    #[error("provider timeout")]
    ProviderTimeout { operation: String, timeout: Duration },

    /// A provider rejected the call because of rate limiting.
    #[error("provider rate limit: {0}")]
    ProviderRateLimit(String),

    /// The run was cancelled before the operation completed.
    #[error("run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeoscopeError>;

impl SeoscopeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::ProviderTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry of the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout { .. } | Self::ProviderRateLimit(_) | Self::Network(_)
        )
    }
}
