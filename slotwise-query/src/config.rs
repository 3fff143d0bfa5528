//! Cache configuration.

use crate::error::{ErrorKind, QueryError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry settings injected into a [`QueryClient`](crate::QueryClient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long fetched data counts as fresh (ms).
    pub stale_time_ms: u64,
    /// How long an entry with no subscribers survives (ms).
    pub gc_time_ms: u64,
    /// Query retries after a network failure.
    pub query_network_retries: u32,
    /// Query retries after a 5xx answer.
    pub query_server_retries: u32,
    /// Mutation retries after a network failure or 5xx answer.
    pub mutation_retries: u32,
    /// First retry delay (ms); doubles per attempt.
    pub retry_base_delay_ms: u64,
    /// Upper bound on a single retry delay (ms).
    pub retry_max_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 5 * 60 * 1000,
            gc_time_ms: 10 * 60 * 1000,
            query_network_retries: 1,
            query_server_retries: 3,
            mutation_retries: 1,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl CacheConfig {
    /// Settings for tests: no retries, no delays.
    pub fn immediate() -> Self {
        Self {
            query_network_retries: 0,
            query_server_retries: 0,
            mutation_retries: 0,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }

    /// Delay before retry number `attempt` (0-based): exponential, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.retry_base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.retry_max_delay_ms))
    }

    /// Whether a query that failed `attempt` times so far should try again.
    pub fn should_retry_query(&self, attempt: u32, error: &QueryError) -> bool {
        match error.kind() {
            ErrorKind::Network => attempt < self.query_network_retries,
            ErrorKind::Server => attempt < self.query_server_retries,
            _ => false,
        }
    }

    /// Whether a mutation that failed `attempt` times so far should try again.
    pub fn should_retry_mutation(&self, attempt: u32, error: &QueryError, limit: Option<u32>) -> bool {
        error.kind().is_retryable() && attempt < limit.unwrap_or(self.mutation_retries)
    }
}
