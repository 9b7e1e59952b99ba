use chrono::{DateTime, Utc};
use concierge_core::Cents;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::StoreError;

/// Flat delivery fee charged on any non-empty cart.
pub const DELIVERY_FEE_CENTS: Cents = 299;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Ordered,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Ordered => "ordered",
            CartStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CartStatus::Active),
            "ordered" => Ok(CartStatus::Ordered),
            "abandoned" => Ok(CartStatus::Abandoned),
            other => Err(StoreError::Invalid(format!("unknown cart status '{}'", other))),
        }
    }
}

/// A priced modifier on a catalog item ("extra cheese", "large").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChoice {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub price_adjustment_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: Cents,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub options: Vec<OptionChoice>,
}

impl CatalogItem {
    /// Resolve requested option ids against this item's options, in request
    /// order. Fails on the first id the item does not offer.
    pub fn resolve_options(&self, option_ids: &[String]) -> Result<Vec<OptionChoice>, StoreError> {
        option_ids
            .iter()
            .map(|id| {
                self.options
                    .iter()
                    .find(|option| &option.id == id)
                    .cloned()
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("option '{}' on item '{}'", id, self.id))
                    })
            })
            .collect()
    }

    pub fn matches(&self, query: &CatalogQuery) -> bool {
        if let Some(max) = query.max_price_cents {
            if self.price_cents > max {
                return false;
            }
        }
        match query.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(text) => {
                let needle = text.to_lowercase();
                self.name.to_lowercase().contains(&needle)
                    || self
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
                    || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub text: Option<String>,
    pub max_price_cents: Option<Cents>,
    pub limit: usize,
}

/// Request to add one catalog item to the owner's active cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLineItem {
    pub item_id: String,
    pub quantity: u32,
    pub option_ids: Vec<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: Cents,
    pub options: Vec<OptionChoice>,
    pub notes: Option<String>,
    pub line_total_cents: Cents,
}

impl LineItem {
    /// Price a request against its catalog entry. Unknown options and a zero
    /// quantity are rejected before anything is written.
    pub fn priced(catalog: &CatalogItem, item: &NewLineItem) -> Result<Self, StoreError> {
        if item.quantity == 0 {
            return Err(StoreError::Invalid("quantity must be at least 1".into()));
        }
        let options = catalog.resolve_options(&item.option_ids)?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: catalog.id.clone(),
            name: catalog.name.clone(),
            quantity: item.quantity,
            unit_price_cents: catalog.price_cents,
            line_total_cents: line_total(item.quantity, catalog.price_cents, &options),
            options,
            notes: item.notes.clone(),
        })
    }
}

/// `quantity * (unit price + sum of option adjustments)`.
pub fn line_total(quantity: u32, unit_price_cents: Cents, options: &[OptionChoice]) -> Cents {
    let adjustments: Cents = options.iter().map(|o| o.price_adjustment_cents).sum();
    Cents::from(quantity) * (unit_price_cents + adjustments)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub owner_key: String,
    pub status: CartStatus,
    pub line_items: Vec<LineItem>,
    pub subtotal_cents: Cents,
    pub delivery_fee_cents: Cents,
    pub total_cents: Cents,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(id: impl Into<String>, owner_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_key: owner_key.into(),
            status: CartStatus::Active,
            line_items: Vec::new(),
            subtotal_cents: 0,
            delivery_fee_cents: 0,
            total_cents: 0,
            updated_at: Utc::now(),
        }
    }

    /// Recompute every derived amount from the line items. Never trust a
    /// stored subtotal.
    pub fn recompute_totals(&mut self) {
        for line in &mut self.line_items {
            line.line_total_cents = line_total(line.quantity, line.unit_price_cents, &line.options);
        }
        self.subtotal_cents = self.line_items.iter().map(|l| l.line_total_cents).sum();
        self.delivery_fee_cents = if self.line_items.is_empty() {
            0
        } else {
            DELIVERY_FEE_CENTS
        };
        self.total_cents = self.subtotal_cents + self.delivery_fee_cents;
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|l| l.quantity).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price_cents: Cents,
    pub options: Vec<OptionChoice>,
    pub notes: Option<String>,
    pub line_total_cents: Cents,
}

impl From<&LineItem> for OrderItem {
    fn from(line: &LineItem) -> Self {
        Self {
            item_id: line.item_id.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
            options: line.options.clone(),
            notes: line.notes.clone(),
            line_total_cents: line.line_total_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub owner_key: String,
    pub cart_id: String,
    pub status: String,
    pub items: Vec<OrderItem>,
    pub subtotal_cents: Cents,
    pub delivery_fee_cents: Cents,
    pub total_cents: Cents,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Snapshot a single line into an order of its own. The returned cart is
    /// already `ordered` and holds only that line.
    pub fn direct(owner_key: &str, line: LineItem) -> (Cart, Self) {
        let mut cart = Cart::new(uuid::Uuid::new_v4().to_string(), owner_key);
        cart.status = CartStatus::Ordered;
        cart.line_items.push(line);
        cart.recompute_totals();
        let order = Order::from_cart(&cart);
        (cart, order)
    }

    /// Snapshot a cart into a confirmed order.
    pub fn from_cart(cart: &Cart) -> Self {
        let now = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            order_number: format!("FC-{}-{}", now.timestamp_millis(), &suffix[..6]),
            owner_key: cart.owner_key.clone(),
            cart_id: cart.id.clone(),
            status: "confirmed".to_string(),
            items: cart.line_items.iter().map(OrderItem::from).collect(),
            subtotal_cents: cart.subtotal_cents,
            delivery_fee_cents: cart.delivery_fee_cents,
            total_cents: cart.total_cents,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub favorite_cuisines: Vec<String>,
    #[serde(default)]
    pub disliked_cuisines: Vec<String>,
    #[serde(default)]
    pub dietary_restrictions: Vec<String>,
    #[serde(default)]
    pub spice_level: Option<String>,
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub sentiment: Sentiment,
    pub notes: Option<String>,
}
