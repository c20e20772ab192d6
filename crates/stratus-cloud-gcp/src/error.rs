//! Google Cloud provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected operation status '{status}' for {operation}")]
    UnexpectedStatus { operation: String, status: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] stratus_cloud::CloudError),
}

impl GcpError {
    /// HTTP status of an API error, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            GcpError::Api { status, .. } => Some(*status),
            GcpError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

impl From<GcpError> for stratus_cloud::CloudError {
    fn from(err: GcpError) -> Self {
        use stratus_cloud::CloudError;
        match err {
            GcpError::CloudError(inner) => inner,
            GcpError::InvalidConfig(msg) => CloudError::InvalidConfig(msg),
            GcpError::Api { status: 404, .. } => CloudError::ResourceNotFound(err.to_string()),
            GcpError::Api {
                status: 401 | 403, ..
            } => CloudError::AuthenticationFailed(err.to_string()),
            GcpError::Api { .. } => CloudError::ApiError(err.to_string()),
            other => CloudError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;
