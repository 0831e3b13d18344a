//! Error types for realtime subscriptions and writes.

use thiserror::Error;

/// Errors raised by realtime backends and the subscription hub.
///
/// Cloneable so a single listener failure can be delivered to every consumer
/// sharing that listener.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealtimeError {
    /// The backend refused or cancelled a listener.
    #[error("listener on {path} failed: {message}")]
    Registration { path: String, message: String },

    /// Network or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote sent a payload that could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Remote rejected the request.
    #[error("request failed with status {status}: {body_summary}")]
    Status { status: u16, body_summary: String },

    /// The hub or backend has been shut down.
    #[error("realtime hub is closed")]
    Closed,
}

impl RealtimeError {
    pub fn registration(path: impl ToString, message: impl Into<String>) -> Self {
        Self::Registration {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RealtimeError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for RealtimeError {
    fn from(err: url::ParseError) -> Self {
        Self::Transport(format!("invalid url: {}", err))
    }
}

/// Result type alias using RealtimeError.
pub type RealtimeResult<T> = Result<T, RealtimeError>;
