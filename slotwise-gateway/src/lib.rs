//! Backend access for Slotwise.
//!
//! - [`DataGateway`]: typed reads and writes, with [`RestGateway`] talking
//!   to the hosted REST API
//! - [`KeyValueStore`] and [`SessionStore`]: persisted strings and the
//!   signed-in session
//! - [`SchedulingQueries`]: gateway calls bound to their cache keys
//!
//! Gateway failures are [`GatewayError`]s and convert into the cache's
//! [`QueryError`](slotwise_query::QueryError) with status and code intact.

mod config;
mod error;
mod gateway;
pub mod keys;
mod queries;
mod rest;
mod storage;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::DataGateway;
pub use queries::SchedulingQueries;
pub use rest::RestGateway;
pub use storage::{AuthSession, FileStore, KeyValueStore, MemoryStore, SESSION_KEY, SessionStore};
