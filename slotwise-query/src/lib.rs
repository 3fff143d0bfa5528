//! Client-side data synchronization for Slotwise.
//!
//! Provides the cache every screen reads through:
//! - a keyed query cache with request dedup, staleness, and idle eviction
//! - optimistic mutations with exact rollback and bounded retry
//! - connectivity and foreground triggers that resynchronize stale data
//!   and flush mutations queued while offline
//!
//! # Architecture
//!
//! The cache is an explicitly constructed [`QueryClient`]; clone it to share
//! it. Entries are addressed by structural [`QueryKey`]s, which nest so that
//! invalidating a prefix reaches every key below it.
//!
//! ## Components
//!
//! - **Client**: owns entries, runs fetches, applies invalidation and GC
//! - **Observer**: a subscription to one entry
//! - **Mutation**: the write pipeline
//! - **Monitors**: connectivity and app lifecycle triggers
//! - **Normalizer**: turns any failure into a display message
//!
//! # Example
//!
//! ```
//! use slotwise_query::{CacheConfig, QueryClient, QueryOptions, query_key};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = QueryClient::new(CacheConfig::default());
//! let observer = client.watch_query(
//!     query_key!["greeting"],
//!     || async { Ok::<_, slotwise_query::QueryError>("hello".to_string()) },
//!     QueryOptions::default(),
//! );
//!
//! let state = observer.settled().await;
//! assert_eq!(state.data.as_deref(), Some("hello"));
//! # }
//! ```

mod client;
mod config;
mod connectivity;
mod error;
mod key;
mod lifecycle;
mod mutation;
mod normalize;
mod observer;
mod state;

pub use client::QueryClient;
pub use config::CacheConfig;
pub use connectivity::{ConnectivityMonitor, ConnectivitySnapshot, ResyncReport};
pub use error::{
    CODE_CANCELLED, CODE_DECODE, CODE_NETWORK, CODE_VALIDATION, ErrorKind, NETWORK_ERROR_CODES,
    NETWORK_ERROR_MARKERS, QueryError, SyncError, SyncResult, is_network_failure,
};
pub use key::{EntityKeys, QueryKey};
pub use lifecycle::{AppState, LifecycleMonitor};
pub use mutation::{Mutation, MutationContext, MutationOptions, NetworkMode};
pub use normalize::{
    AUTH_REQUIRED_MESSAGE, ErrorShape, FALLBACK_MESSAGE, NETWORK_ERROR_MESSAGE,
    SERVER_ERROR_MESSAGE, handle_query_error,
};
pub use observer::{QueryObserver, QueryOptions};
pub use state::{CacheSnapshot, MutationState, MutationStatus, QueryState, QueryStatus};
