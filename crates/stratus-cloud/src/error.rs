//! Cloud provider error types

use std::time::Duration;
use thiserror::Error;

/// Cloud provider errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found for resource type: {0}")]
    ProviderNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The status query itself failed (network, auth, malformed response)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The vendor reported the operation finished with an error
    #[error("Operation {operation} failed: {detail}")]
    OperationFailed {
        operation: String,
        detail: crate::operation::OperationError,
    },

    /// The deadline elapsed while the operation was still pending
    #[error("Timeout waiting for operation {operation} after {elapsed:?}")]
    Timeout { operation: String, elapsed: Duration },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the error came from an exhausted polling deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, CloudError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
