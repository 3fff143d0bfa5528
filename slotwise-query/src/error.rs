//! Error types for the query layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for cache operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by cache operations themselves (not by a fetch).
#[derive(Debug, Error)]
pub enum SyncError {
    /// Cached data could not be converted to or from the requested type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Error code attached to failures that never reached the network.
pub const CODE_NETWORK: &str = "NETWORK_ERROR";
/// Error code for input rejected before submission.
pub const CODE_VALIDATION: &str = "VALIDATION_ERROR";
/// Error code for fetches abandoned by the cache.
pub const CODE_CANCELLED: &str = "CANCELLED";
/// Error code for data that could not be decoded into the requested type.
pub const CODE_DECODE: &str = "DECODE_ERROR";

/// Codes that identify a failed connection rather than a server answer.
pub const NETWORK_ERROR_CODES: &[&str] = &[
    CODE_NETWORK,
    "ERR_NETWORK",
    "ECONNABORTED",
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOTFOUND",
    "ETIMEDOUT",
];

/// Lower-case message fragments that identify a failed connection.
pub const NETWORK_ERROR_MARKERS: &[&str] = &[
    "network error",
    "network request failed",
    "failed to fetch",
    "load failed",
    "internet connection appears to be offline",
    "error sending request",
];

/// Returns true if the code or message carries a network-failure signature.
pub fn is_network_failure(code: Option<&str>, message: Option<&str>) -> bool {
    if code.is_some_and(|c| NETWORK_ERROR_CODES.iter().any(|n| c.eq_ignore_ascii_case(n))) {
        return true;
    }
    message.is_some_and(|m| {
        let lower = m.to_ascii_lowercase();
        NETWORK_ERROR_MARKERS.iter().any(|marker| lower.contains(marker))
    })
}

/// A failed query or mutation as stored in the cache.
///
/// This is the typed error every gateway function rejects with: an optional
/// HTTP-like status, a message, and an optional machine-readable code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct QueryError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl QueryError {
    /// An error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            code: None,
        }
    }

    /// An error answered by the server with `status`.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(message)
        }
    }

    /// A request that never got an answer.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message).with_code(CODE_NETWORK)
    }

    /// Input rejected before submission.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(message).with_code(CODE_VALIDATION)
    }

    /// A fetch the cache abandoned.
    pub fn cancelled() -> Self {
        Self::new("query was cancelled").with_code(CODE_CANCELLED)
    }

    /// Data that could not be converted between its typed and cached forms.
    pub fn decode(err: &serde_json::Error) -> Self {
        Self::new(format!("query data conversion failed: {err}")).with_code(CODE_DECODE)
    }

    /// Attaches a machine-readable code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Classifies the error for retry and display decisions.
    pub fn kind(&self) -> ErrorKind {
        match self.code.as_deref() {
            Some(CODE_VALIDATION) => return ErrorKind::Validation,
            Some(CODE_CANCELLED) => return ErrorKind::Cancelled,
            _ => {}
        }
        match self.status {
            Some(s) if s >= 500 => ErrorKind::Server,
            Some(s) if (400..500).contains(&s) => ErrorKind::Client,
            _ if is_network_failure(self.code.as_deref(), Some(&self.message)) => {
                ErrorKind::Network
            }
            _ => ErrorKind::Other,
        }
    }
}

/// Coarse classes of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request never got an answer.
    Network,
    /// 4xx answer.
    Client,
    /// 5xx answer.
    Server,
    /// Rejected before submission.
    Validation,
    /// Abandoned by the cache.
    Cancelled,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Only transient failures are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Server)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Client => "client",
            Self::Server => "server",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl From<SyncError> for QueryError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Serialization(e) => QueryError::decode(&e),
            SyncError::ChannelClosed => QueryError::cancelled(),
        }
    }
}
