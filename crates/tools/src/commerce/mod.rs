//! The commerce tool set: catalog search, cart management, checkout and
//! profile. Mutating tools hold the owner lock for their whole body so two
//! concurrent requests for one owner never interleave writes.

mod cart;
mod catalog;
mod orders;
mod profile;
pub mod views;

use concierge_store::{CommerceStore, OwnerLocks};
use std::sync::Arc;

use crate::error::ToolError;
use crate::registry::ToolRegistry;

pub use cart::{AddItemToCart, ClearCart, RemoveCartItem, ViewCart};
pub use catalog::SearchCatalog;
pub use orders::{Purchase, SubmitCartOrder};
pub use profile::{GetUserContext, LogFeedback, UpdatePreferences};

/// Shared handles every commerce tool needs.
#[derive(Clone)]
pub struct CommerceDeps {
    pub store: Arc<dyn CommerceStore>,
    pub locks: OwnerLocks,
}

/// Build a registry holding every commerce tool with its default gating.
pub fn commerce_registry(deps: CommerceDeps) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(SearchCatalog::new(deps.clone())))?
        .register(Arc::new(GetUserContext::new(deps.clone())))?
        .register(Arc::new(AddItemToCart::new(deps.clone())))?
        .register(Arc::new(ViewCart::new(deps.clone())))?
        .register(Arc::new(RemoveCartItem::new(deps.clone())))?
        .register(Arc::new(ClearCart::new(deps.clone())))?
        .register(Arc::new(SubmitCartOrder::new(deps.clone())))?
        .register(Arc::new(Purchase::new(deps.clone())))?
        .register(Arc::new(UpdatePreferences::new(deps.clone())))?
        .register(Arc::new(LogFeedback::new(deps)))?;
    Ok(registry)
}
