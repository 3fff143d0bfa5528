//! Subscriptions to cache entries.

use crate::client::{QueryClient, wait_settled};
use crate::error::QueryError;
use crate::key::QueryKey;
use crate::state::{CacheSnapshot, QueryState, QueryStatus};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tokio::sync::watch;

/// Per-subscription settings for [`QueryClient::watch_query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// A disabled observer never triggers a fetch.
    pub enabled: bool,
    /// Overrides the client's freshness window for this entry.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }
}

/// A live subscription to one cache entry.
///
/// Dropping the observer releases the subscription; once an entry has no
/// observers left its idle window starts.
pub struct QueryObserver<T> {
    client: QueryClient,
    key: QueryKey,
    entry_id: u64,
    rx: watch::Receiver<CacheSnapshot>,
    enabled: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for QueryObserver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryObserver")
            .field("key", &self.key)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl<T> QueryObserver<T> {
    pub(crate) fn new(
        client: QueryClient,
        key: QueryKey,
        entry_id: u64,
        rx: watch::Receiver<CacheSnapshot>,
        enabled: bool,
    ) -> Self {
        Self {
            client,
            key,
            entry_id,
            rx,
            enabled,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> QueryStatus {
        self.rx.borrow().status
    }

    pub fn error(&self) -> Option<QueryError> {
        self.rx.borrow().error.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.rx.borrow().is_fetching
    }

    /// Waits for the next change. Returns false once the entry is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Enables or disables this observer. Enabling a stale entry fetches it.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        self.client
            .set_observer_enabled(&self.key, self.entry_id, enabled);
    }
}

impl<T: DeserializeOwned> QueryObserver<T> {
    /// Current state.
    pub fn state(&self) -> QueryState<T> {
        QueryState::from_snapshot(&self.rx.borrow())
    }

    /// Current data, if any.
    pub fn data(&self) -> Option<T> {
        self.state().data
    }

    /// Waits until no fetch is in flight and returns the state.
    pub async fn settled(&self) -> QueryState<T> {
        match wait_settled(self.rx.clone()).await {
            Ok(snapshot) => QueryState::from_snapshot(&snapshot),
            Err(_) => self.state(),
        }
    }

    /// Fetches regardless of freshness, sharing a fetch already in flight,
    /// and waits for it to settle.
    pub async fn refetch(&self) -> QueryState<T> {
        self.client.refetch_entry(&self.key, self.entry_id);
        self.settled().await
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        self.client
            .release_observer(&self.key, self.entry_id, self.enabled);
    }
}
