//! Error types for WikiScribe.
//!
//! Library crates use [`WikiScribeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all WikiScribe operations.
#[derive(Debug, thiserror::Error)]
pub enum WikiScribeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The wiki API answered with a non-success status.
    #[error("wiki API returned HTTP {status}: {message}")]
    Wiki { status: u16, message: String },

    /// Database or session store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Diagram encoding or Markdown rendering error.
    #[error("render error: {0}")]
    Render(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (missing publish coordinates, bad payload, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Confirmation session lifecycle error.
    #[error("session error: {message}")]
    Session { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, WikiScribeError>;

impl WikiScribeError {
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

    /// Create a session error from any displayable message.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = WikiScribeError::config("missing API token");
        assert_eq!(err.to_string(), "config error: missing API token");

        let err = WikiScribeError::Wiki {
            status: 403,
            message: "not permitted".into(),
        };
        assert_eq!(err.to_string(), "wiki API returned HTTP 403: not permitted");

        let err = WikiScribeError::session("session 42 already resolved");
        assert!(err.to_string().contains("already resolved"));
    }
}
