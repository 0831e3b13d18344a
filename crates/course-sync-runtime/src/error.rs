//! Error types for the sync services.

use auth_gated_client::ApiError;
use observable_store::StoreError;
use realtime_multiplexer::RealtimeError;
use sync_config_and_utils::CoreError;
use thiserror::Error;

/// Errors surfaced by [`AppContext`](crate::AppContext) and the services.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A fetch for one entity resolved to nothing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A live follower was requested outside a tokio runtime.
    #[error("no async runtime available: {0}")]
    Runtime(String),
}

impl ServiceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias using ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;
