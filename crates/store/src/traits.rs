use async_trait::async_trait;

use crate::model::{
    Cart, CatalogItem, CatalogQuery, Feedback, NewLineItem, Order, Preferences,
};
use crate::StoreError;

/// Durable commerce state, always scoped by owner key.
///
/// Every mutating operation is all-or-nothing: it either commits every
/// sub-write it needs or leaves the store untouched and returns an error.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Insert or replace catalog items and their options.
    async fn seed_catalog(&self, items: Vec<CatalogItem>) -> Result<(), StoreError>;

    async fn search_catalog(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, StoreError>;

    async fn catalog_item(&self, item_id: &str) -> Result<Option<CatalogItem>, StoreError>;

    /// Return the owner's active cart, creating it if none exists. Concurrent
    /// callers for the same owner always observe the same cart.
    async fn get_or_create_active_cart(&self, owner_key: &str) -> Result<Cart, StoreError>;

    async fn active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError>;

    /// Add a line item (with its options) to the active cart.
    async fn add_line_item(&self, owner_key: &str, item: NewLineItem) -> Result<Cart, StoreError>;

    async fn remove_line_item(
        &self,
        owner_key: &str,
        line_item_id: &str,
    ) -> Result<Cart, StoreError>;

    /// Mark the active cart abandoned. Returns the abandoned cart, if any.
    async fn abandon_active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError>;

    /// Turn the active cart into an order. When `cart_id` is given it must
    /// name the owner's active cart.
    async fn submit_order(
        &self,
        owner_key: &str,
        cart_id: Option<&str>,
    ) -> Result<Order, StoreError>;

    /// Order one catalog item on its own, leaving the active cart as it was.
    /// The order header, its item and option rows commit together or not
    /// at all.
    async fn purchase_item(&self, owner_key: &str, item: NewLineItem) -> Result<Order, StoreError>;

    /// Orders for the owner, newest first.
    async fn recent_orders(&self, owner_key: &str, limit: usize) -> Result<Vec<Order>, StoreError>;

    async fn preferences(&self, owner_key: &str) -> Result<Option<Preferences>, StoreError>;

    async fn upsert_preferences(
        &self,
        owner_key: &str,
        preferences: Preferences,
    ) -> Result<Preferences, StoreError>;

    async fn record_feedback(&self, owner_key: &str, feedback: Feedback) -> Result<(), StoreError>;
}
