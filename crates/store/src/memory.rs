use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::model::{
    Cart, CartStatus, CatalogItem, CatalogQuery, Feedback, LineItem, NewLineItem, Order,
    Preferences,
};
use crate::{CommerceStore, StoreError};

/// Everything one owner has touched.
#[derive(Default)]
struct OwnerLedger {
    carts: Vec<Cart>,
    orders: Vec<Order>,
    preferences: Option<Preferences>,
    feedback: Vec<Feedback>,
}

impl OwnerLedger {
    fn active_cart_mut(&mut self) -> Option<&mut Cart> {
        self.carts.iter_mut().find(|c| c.status == CartStatus::Active)
    }

    fn active_cart_or_create(&mut self, owner_key: &str) -> &mut Cart {
        let index = match self.carts.iter().position(|c| c.status == CartStatus::Active) {
            Some(index) => index,
            None => {
                self.carts
                    .push(Cart::new(Uuid::new_v4().to_string(), owner_key));
                self.carts.len() - 1
            }
        };
        &mut self.carts[index]
    }
}

/// In-process [`CommerceStore`]. State is partitioned per owner key; there is
/// no shared cart. Each operation builds its full result before mutating, so
/// a failure leaves the ledger untouched.
#[derive(Default)]
pub struct MemoryStore {
    catalog: RwLock<BTreeMap<String, CatalogItem>>,
    owners: Mutex<HashMap<String, OwnerLedger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feedback entries recorded for an owner, oldest first.
    pub fn feedback_for(&self, owner_key: &str) -> Vec<Feedback> {
        self.owners
            .lock()
            .get(owner_key)
            .map(|ledger| ledger.feedback.clone())
            .unwrap_or_default()
    }

    fn resolve_line(&self, item: &NewLineItem) -> Result<LineItem, StoreError> {
        let catalog = self.catalog.read();
        let entry = catalog
            .get(&item.item_id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog item '{}'", item.item_id)))?;
        LineItem::priced(entry, item)
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn seed_catalog(&self, items: Vec<CatalogItem>) -> Result<(), StoreError> {
        let mut catalog = self.catalog.write();
        for item in items {
            catalog.insert(item.id.clone(), item);
        }
        Ok(())
    }

    async fn search_catalog(&self, query: &CatalogQuery) -> Result<Vec<CatalogItem>, StoreError> {
        let catalog = self.catalog.read();
        let mut found: Vec<CatalogItem> = catalog
            .values()
            .filter(|item| item.matches(query))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(query.limit.max(1));
        Ok(found)
    }

    async fn catalog_item(&self, item_id: &str) -> Result<Option<CatalogItem>, StoreError> {
        Ok(self.catalog.read().get(item_id).cloned())
    }

    async fn get_or_create_active_cart(&self, owner_key: &str) -> Result<Cart, StoreError> {
        let mut owners = self.owners.lock();
        let ledger = owners.entry(owner_key.to_string()).or_default();
        Ok(ledger.active_cart_or_create(owner_key).clone())
    }

    async fn active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError> {
        let mut owners = self.owners.lock();
        Ok(owners
            .get_mut(owner_key)
            .and_then(|ledger| ledger.active_cart_mut().map(|c| c.clone())))
    }

    async fn add_line_item(&self, owner_key: &str, item: NewLineItem) -> Result<Cart, StoreError> {
        let line = self.resolve_line(&item)?;
        let mut owners = self.owners.lock();
        let cart = owners
            .entry(owner_key.to_string())
            .or_default()
            .active_cart_or_create(owner_key);
        cart.line_items.push(line);
        cart.recompute_totals();
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn remove_line_item(
        &self,
        owner_key: &str,
        line_item_id: &str,
    ) -> Result<Cart, StoreError> {
        let mut owners = self.owners.lock();
        let cart = owners
            .get_mut(owner_key)
            .and_then(OwnerLedger::active_cart_mut)
            .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))?;
        let before = cart.line_items.len();
        cart.line_items.retain(|line| line.id != line_item_id);
        if cart.line_items.len() == before {
            return Err(StoreError::NotFound(format!("line item '{}'", line_item_id)));
        }
        cart.recompute_totals();
        cart.updated_at = Utc::now();
        Ok(cart.clone())
    }

    async fn abandon_active_cart(&self, owner_key: &str) -> Result<Option<Cart>, StoreError> {
        let mut owners = self.owners.lock();
        Ok(owners
            .get_mut(owner_key)
            .and_then(OwnerLedger::active_cart_mut)
            .map(|cart| {
                cart.status = CartStatus::Abandoned;
                cart.updated_at = Utc::now();
                cart.clone()
            }))
    }

    async fn submit_order(
        &self,
        owner_key: &str,
        cart_id: Option<&str>,
    ) -> Result<Order, StoreError> {
        let mut owners = self.owners.lock();
        let ledger = owners
            .get_mut(owner_key)
            .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))?;
        let cart = ledger
            .active_cart_mut()
            .ok_or_else(|| StoreError::NotFound(format!("active cart for '{}'", owner_key)))?;
        if let Some(requested) = cart_id {
            if requested != cart.id {
                return Err(StoreError::NotFound(format!(
                    "cart '{}' is not the active cart",
                    requested
                )));
            }
        }
        if cart.is_empty() {
            return Err(StoreError::EmptyCart(cart.id.clone()));
        }

        cart.recompute_totals();
        let order = Order::from_cart(cart);
        cart.status = CartStatus::Ordered;
        cart.updated_at = Utc::now();
        ledger.orders.push(order.clone());
        Ok(order)
    }

    async fn purchase_item(&self, owner_key: &str, item: NewLineItem) -> Result<Order, StoreError> {
        let line = self.resolve_line(&item)?;
        let (cart, order) = Order::direct(owner_key, line);
        let mut owners = self.owners.lock();
        let ledger = owners.entry(owner_key.to_string()).or_default();
        ledger.carts.push(cart);
        ledger.orders.push(order.clone());
        Ok(order)
    }

    async fn recent_orders(&self, owner_key: &str, limit: usize) -> Result<Vec<Order>, StoreError> {
        let owners = self.owners.lock();
        Ok(owners
            .get(owner_key)
            .map(|ledger| ledger.orders.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn preferences(&self, owner_key: &str) -> Result<Option<Preferences>, StoreError> {
        let owners = self.owners.lock();
        Ok(owners.get(owner_key).and_then(|l| l.preferences.clone()))
    }

    async fn upsert_preferences(
        &self,
        owner_key: &str,
        preferences: Preferences,
    ) -> Result<Preferences, StoreError> {
        let mut owners = self.owners.lock();
        owners.entry(owner_key.to_string()).or_default().preferences = Some(preferences.clone());
        Ok(preferences)
    }

    async fn record_feedback(&self, owner_key: &str, feedback: Feedback) -> Result<(), StoreError> {
        let mut owners = self.owners.lock();
        owners.entry(owner_key.to_string()).or_default().feedback.push(feedback);
        Ok(())
    }
}
