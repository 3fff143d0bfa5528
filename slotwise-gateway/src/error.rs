//! Gateway error types.

use slotwise_query::{CODE_NETWORK, ErrorShape, QueryError};
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur talking to the backend or local storage.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("authentication required")]
    AuthRequired,
}

impl GatewayError {
    /// HTTP-like status, where one applies.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Http(e) => e.status().map(|s| s.as_u16()),
            GatewayError::NotFound(_) => Some(404),
            GatewayError::AuthRequired => Some(401),
            _ => None,
        }
    }

    /// Machine-readable code, where one applies.
    pub fn code(&self) -> Option<&str> {
        match self {
            GatewayError::Api { code, .. } => code.as_deref(),
            GatewayError::Network(_) => Some(CODE_NETWORK),
            GatewayError::Http(e) if e.is_connect() || e.is_timeout() => Some(CODE_NETWORK),
            _ => None,
        }
    }

    /// Returns true if the request never got an answer.
    pub fn is_network(&self) -> bool {
        self.code() == Some(CODE_NETWORK)
    }
}

impl ErrorShape for GatewayError {
    fn status(&self) -> Option<u16> {
        GatewayError::status(self)
    }

    fn code(&self) -> Option<&str> {
        GatewayError::code(self)
    }

    fn message(&self) -> Option<&str> {
        match self {
            GatewayError::Api { message, .. }
            | GatewayError::Network(message)
            | GatewayError::Decode(message)
            | GatewayError::NotFound(message)
            | GatewayError::Config(message) => Some(message),
            _ => None,
        }
    }
}

impl From<GatewayError> for QueryError {
    fn from(err: GatewayError) -> Self {
        let status = err.status();
        let code = err.code().map(str::to_string);
        let message = match err {
            GatewayError::Api { message, .. } => message,
            other => other.to_string(),
        };
        QueryError {
            status,
            message,
            code,
        }
    }
}
