//! Query keys for the scheduling collections.
//!
//! Every read and every invalidation in the app goes through these, so a
//! write that invalidates `CLIENTS.all()` reaches every client list and
//! detail.

use slotwise_query::EntityKeys;

pub const CLIENTS: EntityKeys = EntityKeys::new("clients");
pub const APPOINTMENTS: EntityKeys = EntityKeys::new("appointments");
