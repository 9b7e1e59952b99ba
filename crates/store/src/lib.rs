//! Persistence for carts, orders, preferences and the catalog.
//!
//! [`CommerceStore`] is the only way tools touch durable state. Two
//! implementations ship: [`SqliteStore`] for real deployments and
//! [`MemoryStore`] for tests and ephemeral runs. Both keep every piece of
//! state keyed by owner.

pub mod error;
pub mod memory;
pub mod model;
pub mod owner_locks;
pub mod sqlite;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use model::*;
pub use owner_locks::{OwnerGuard, OwnerLocks};
pub use sqlite::SqliteStore;
pub use traits::CommerceStore;
