//! Maps any failure to the one string a screen shows.

use crate::error::{QueryError, is_network_failure};
use serde_json::Value;
use tracing::debug;

pub const AUTH_REQUIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const SERVER_ERROR_MESSAGE: &str = "Something went wrong on our end. Please try again later.";
pub const NETWORK_ERROR_MESSAGE: &str =
    "Unable to connect. Please check your internet connection and try again.";
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Whatever a failure exposes about itself.
pub trait ErrorShape {
    fn status(&self) -> Option<u16> {
        None
    }

    fn code(&self) -> Option<&str> {
        None
    }

    fn message(&self) -> Option<&str> {
        None
    }
}

impl ErrorShape for QueryError {
    fn status(&self) -> Option<u16> {
        self.status
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn message(&self) -> Option<&str> {
        Some(&self.message)
    }
}

/// An arbitrary object: `status` (or `statusCode`), `code`, `message`.
impl ErrorShape for Value {
    fn status(&self) -> Option<u16> {
        let status = self.get("status").or_else(|| self.get("statusCode"))?;
        match status {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn code(&self) -> Option<&str> {
        self.get("code").and_then(Value::as_str)
    }

    fn message(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => self.get("message").and_then(Value::as_str),
        }
    }
}

impl ErrorShape for str {
    fn message(&self) -> Option<&str> {
        Some(self)
    }
}

impl ErrorShape for String {
    fn message(&self) -> Option<&str> {
        Some(self)
    }
}

/// Returns the display message for `error`, or `None` when there is none.
pub fn handle_query_error<E: ErrorShape + ?Sized>(error: Option<&E>) -> Option<String> {
    let error = error?;
    let status = error.status();
    let code = error.code();
    let message = error.message().map(str::trim).filter(|m| !m.is_empty());
    debug!(?status, ?code, ?message, "Normalizing query error");

    let display = match status {
        Some(401) => AUTH_REQUIRED_MESSAGE,
        Some(s) if s >= 500 => SERVER_ERROR_MESSAGE,
        _ if is_network_failure(code, message) => NETWORK_ERROR_MESSAGE,
        _ => message.unwrap_or(FALLBACK_MESSAGE),
    };
    Some(display.to_string())
}
