//! Typed tool outputs. Each tool's output contract is generated from these
//! structs, so what the model reads and what the registry checks cannot drift.

use concierge_core::{format_cents, Cents};
use concierge_store::{Cart, CatalogItem, LineItem, OptionChoice, Order, OrderItem, Preferences};
use schemars::JsonSchema;
use serde::Serialize;

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub option_id: String,
    pub label: String,
    pub price_adjustment: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItemView {
    pub item_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: String,
    pub price_cents: Cents,
    pub tags: Vec<String>,
    pub options: Vec<OptionView>,
}

impl From<&CatalogItem> for CatalogItemView {
    fn from(item: &CatalogItem) -> Self {
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            price: format_cents(item.price_cents),
            price_cents: item.price_cents,
            tags: item.tags.clone(),
            options: item
                .options
                .iter()
                .map(|o| OptionView {
                    option_id: o.id.clone(),
                    label: o.label.clone(),
                    price_adjustment: format_cents(o.price_adjustment_cents),
                })
                .collect(),
        }
    }
}

fn labels(options: &[OptionChoice]) -> Vec<String> {
    options.iter().map(|o| o.label.clone()).collect()
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub line_item_id: String,
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub options: Vec<String>,
    pub notes: Option<String>,
    pub line_total: String,
}

impl From<&LineItem> for LineView {
    fn from(line: &LineItem) -> Self {
        Self {
            line_item_id: line.id.clone(),
            item_id: line.item_id.clone(),
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: format_cents(line.unit_price_cents),
            options: labels(&line.options),
            notes: line.notes.clone(),
            line_total: format_cents(line.line_total_cents),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    /// Absent when the owner has no active cart.
    pub cart_id: Option<String>,
    pub status: String,
    pub item_count: u32,
    pub line_items: Vec<LineView>,
    pub subtotal: String,
    pub delivery_fee: String,
    pub total: String,
    pub subtotal_cents: Cents,
    pub total_cents: Cents,
}

impl CartView {
    pub fn empty() -> Self {
        Self {
            cart_id: None,
            status: "empty".to_string(),
            item_count: 0,
            line_items: Vec::new(),
            subtotal: format_cents(0),
            delivery_fee: format_cents(0),
            total: format_cents(0),
            subtotal_cents: 0,
            total_cents: 0,
        }
    }
}

impl From<&Cart> for CartView {
    fn from(cart: &Cart) -> Self {
        Self {
            cart_id: Some(cart.id.clone()),
            status: cart.status.as_str().to_string(),
            item_count: cart.item_count(),
            line_items: cart.line_items.iter().map(LineView::from).collect(),
            subtotal: format_cents(cart.subtotal_cents),
            delivery_fee: format_cents(cart.delivery_fee_cents),
            total: format_cents(cart.total_cents),
            subtotal_cents: cart.subtotal_cents,
            total_cents: cart.total_cents,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
    pub options: Vec<String>,
    pub line_total: String,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: format_cents(item.unit_price_cents),
            options: labels(&item.options),
            line_total: format_cents(item.line_total_cents),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_id: String,
    pub order_number: String,
    pub status: String,
    pub items: Vec<OrderItemView>,
    pub subtotal: String,
    pub delivery_fee: String,
    pub total: String,
    pub total_cents: Cents,
    pub created_at: String,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            status: order.status.clone(),
            items: order.items.iter().map(OrderItemView::from).collect(),
            subtotal: format_cents(order.subtotal_cents),
            delivery_fee: format_cents(order.delivery_fee_cents),
            total: format_cents(order.total_cents),
            total_cents: order.total_cents,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesView {
    pub favorite_cuisines: Vec<String>,
    pub disliked_cuisines: Vec<String>,
    pub dietary_restrictions: Vec<String>,
    pub spice_level: Option<String>,
    pub budget_range: Option<String>,
    pub notes: Option<String>,
}

impl From<Preferences> for PreferencesView {
    fn from(p: Preferences) -> Self {
        Self {
            favorite_cuisines: p.favorite_cuisines,
            disliked_cuisines: p.disliked_cuisines,
            dietary_restrictions: p.dietary_restrictions,
            spice_level: p.spice_level,
            budget_range: p.budget_range,
            notes: p.notes,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct SearchCatalogOutput {
    pub count: usize,
    pub items: Vec<CatalogItemView>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserContextOutput {
    pub has_preferences: bool,
    pub preferences: PreferencesView,
    pub recent_orders: Vec<OrderView>,
    pub active_cart_items: u32,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddedLine {
    pub line_item_id: String,
    pub name: String,
    pub quantity: u32,
    pub line_total: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AddItemOutput {
    pub message: String,
    pub added: AddedLine,
    pub cart: CartView,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CartChangeOutput {
    pub message: String,
    pub cart: CartView,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClearCartOutput {
    pub cleared: bool,
    pub removed_items: u32,
    pub message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct OrderConfirmation {
    pub message: String,
    pub order: OrderView,
}

impl From<&Order> for OrderConfirmation {
    fn from(order: &Order) -> Self {
        Self {
            message: format!(
                "Order {} confirmed. Total charged: {}.",
                order.order_number,
                format_cents(order.total_cents)
            ),
            order: order.into(),
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PreferencesOutput {
    pub message: String,
    pub preferences: PreferencesView,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct FeedbackOutput {
    pub recorded: bool,
}
