//! Error types for the request client.

use thiserror::Error;

/// Errors raised while issuing API calls.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("API returned status {status}: {body_summary}")]
    Status { status: u16, body_summary: String },

    /// Reply body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Endpoint could not be turned into a URL.
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),

    /// A call that requires a credential was made while signed out.
    /// Only raised when strict auth is enabled.
    #[error("authentication required for {endpoint}")]
    Unauthenticated { endpoint: String },

    /// The credential source went away before publishing a definitive value.
    #[error("credential source closed")]
    CredentialClosed,

    /// Failure reported by a non-HTTP transport.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;
