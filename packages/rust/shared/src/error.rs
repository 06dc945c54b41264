//! Error types for zivi.
//!
//! Library crates use [`ZiviError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all zivi operations.
#[derive(Debug, thiserror::Error)]
pub enum ZiviError {
    /// Malformed query parameters, rejected before any network call.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Non-2xx response or transport failure from the remote service.
    #[error("{}", api_message(.status, .body))]
    Api { status: Option<u16>, body: String },

    /// A card was saved with neither a display name nor an organisation id.
    #[error("card has neither a display name nor an organisation id")]
    MissingIdentifier,

    /// Unexpected shape in a nested record.
    #[error("format error: {message}")]
    Format { message: String },

    /// Configuration loading or credential error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization failure or misuse of an output frame.
    #[error("output error: {0}")]
    Output(String),

    /// The run was cancelled by the user.
    #[error("interrupted")]
    Interrupted,
}

fn api_message(status: &Option<u16>, body: &str) -> String {
    match status {
        Some(code) => format!("API request failed with status {code}: {body}"),
        None => format!("API request failed: {body}"),
    }
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ZiviError>;

impl ZiviError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a format error from any displayable message.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an API error for a response with the given status.
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
            body: body.into(),
        }
    }

    /// Create an API error for a failure that never produced a response.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Api {
            status: None,
            body: msg.into(),
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
