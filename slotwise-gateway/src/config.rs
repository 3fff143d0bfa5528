//! Backend connection settings.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the hosted backend lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Project URL, e.g. `https://abc.backend.example`.
    pub base_url: String,
    /// Public (anon) API key sent with every request.
    pub api_key: String,
    /// Per-request timeout (ms).
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:54321".to_string(),
            api_key: String::new(),
            timeout_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Rejects settings no request could succeed with.
    pub fn validate(&self) -> GatewayResult<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "base_url must be an http(s) URL, got {url:?}"
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::Config("api_key is required".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(GatewayError::Config("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// REST endpoint for `table`.
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim().trim_end_matches('/'), table)
    }
}
