//! Snapshots of query and mutation state handed to callers.
//!
//! The cache stores every value as JSON; these types are the typed views
//! observers and mutation handles publish.

use crate::error::QueryError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

/// Lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueryStatus {
    /// Nothing fetched yet and nothing in flight.
    #[default]
    Idle,
    /// First fetch in flight, no data yet.
    Pending,
    /// Last fetch succeeded.
    Success,
    /// Last fetch failed. Earlier data may still be present.
    Error,
}

/// Untyped entry state as published by the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSnapshot {
    pub data: Option<Value>,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub data_updated_at: Option<Instant>,
    pub error_updated_at: Option<Instant>,
}

/// Typed view of a cached query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<QueryError>,
    pub is_fetching: bool,
    pub data_updated_at: Option<Instant>,
}

impl<T> QueryState<T> {
    pub fn is_idle(&self) -> bool {
        self.status == QueryStatus::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.status == QueryStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

impl<T: DeserializeOwned> QueryState<T> {
    /// Decodes a snapshot. Data that does not fit `T` is dropped with a
    /// warning and reported through `error`.
    pub fn from_snapshot(snapshot: &CacheSnapshot) -> Self {
        let mut error = snapshot.error.clone();
        let mut status = snapshot.status;
        let data = match &snapshot.data {
            Some(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(data) => Some(data),
                Err(e) => {
                    warn!("Cached data does not match requested type: {}", e);
                    error = Some(QueryError::decode(&e));
                    status = QueryStatus::Error;
                    None
                }
            },
            None => None,
        };

        Self {
            data,
            status,
            error,
            is_fetching: snapshot.is_fetching,
            data_updated_at: snapshot.data_updated_at,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            is_fetching: false,
            data_updated_at: None,
        }
    }
}

/// Lifecycle of one mutation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MutationStatus {
    #[default]
    Idle,
    /// Waiting in the offline queue.
    Paused,
    /// Request in flight.
    Mutating,
    Success,
    Error,
}

/// State published by a [`Mutation`](crate::Mutation) handle.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationState<V, D> {
    pub status: MutationStatus,
    pub data: Option<D>,
    pub error: Option<QueryError>,
    pub variables: Option<V>,
    /// Failed attempts of the latest call, retries included.
    pub failure_count: u32,
}

impl<V, D> Default for MutationState<V, D> {
    fn default() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
            variables: None,
            failure_count: 0,
        }
    }
}

impl<V, D> MutationState<V, D> {
    pub fn is_idle(&self) -> bool {
        self.status == MutationStatus::Idle
    }

    pub fn is_paused(&self) -> bool {
        self.status == MutationStatus::Paused
    }

    pub fn is_mutating(&self) -> bool {
        self.status == MutationStatus::Mutating
    }

    pub fn is_success(&self) -> bool {
        self.status == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == MutationStatus::Error
    }
}
