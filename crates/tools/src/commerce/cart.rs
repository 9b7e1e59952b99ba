use async_trait::async_trait;
use concierge_core::format_cents;
use concierge_store::NewLineItem;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::views::{AddItemOutput, AddedLine, CartChangeOutput, CartView, ClearCartOutput};
use super::CommerceDeps;
use crate::contract::{parse_input, schema_for, to_output};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::traits::Tool;

pub(crate) fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddItemInput {
    /// Catalog item id from search_catalog.
    pub item_id: String,
    #[serde(default = "default_quantity")]
    #[schemars(range(min = 1, max = 50))]
    pub quantity: u32,
    /// Option ids offered by the item, e.g. a size or topping.
    #[serde(default)]
    pub option_ids: Vec<String>,
    /// Free-form preparation notes.
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<AddItemInput> for NewLineItem {
    fn from(input: AddItemInput) -> Self {
        NewLineItem {
            item_id: input.item_id,
            quantity: input.quantity,
            option_ids: input.option_ids,
            notes: input.notes,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoInput {}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveItemInput {
    /// Line item id as shown by view_cart.
    pub line_item_id: String,
}

pub struct AddItemToCart {
    deps: CommerceDeps,
}

impl AddItemToCart {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for AddItemToCart {
    fn name(&self) -> &'static str {
        "add_item_to_cart"
    }

    fn description(&self) -> &'static str {
        "Add a catalog item to the user's active cart, creating the cart if needed."
    }

    fn input_schema(&self) -> Value {
        schema_for::<AddItemInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<AddItemOutput>()
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: AddItemInput = parse_input(input)?;
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;

        let cart = self
            .deps
            .store
            .add_line_item(&ctx.owner_key, input.into())
            .await?;
        let Some(added) = cart.line_items.last() else {
            return Err(ToolError::Execution("cart has no line items after add".into()));
        };
        info!(owner_key = %ctx.owner_key, item_id = %added.item_id, "item added to cart");

        to_output(&AddItemOutput {
            message: format!(
                "Added {} x {} to the cart. Subtotal is now {}.",
                added.quantity,
                added.name,
                format_cents(cart.subtotal_cents)
            ),
            added: AddedLine {
                line_item_id: added.id.clone(),
                name: added.name.clone(),
                quantity: added.quantity,
                line_total: format_cents(added.line_total_cents),
            },
            cart: CartView::from(&cart),
        })
    }
}

pub struct ViewCart {
    deps: CommerceDeps,
}

impl ViewCart {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for ViewCart {
    fn name(&self) -> &'static str {
        "view_cart"
    }

    fn description(&self) -> &'static str {
        "Show the user's active cart with line items and totals."
    }

    fn input_schema(&self) -> Value {
        schema_for::<NoInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<CartView>()
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let NoInput {} = parse_input(input)?;
        let cart = self.deps.store.active_cart(&ctx.owner_key).await?;
        to_output(&cart.as_ref().map(CartView::from).unwrap_or_else(CartView::empty))
    }
}

pub struct RemoveCartItem {
    deps: CommerceDeps,
}

impl RemoveCartItem {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for RemoveCartItem {
    fn name(&self) -> &'static str {
        "remove_cart_item"
    }

    fn description(&self) -> &'static str {
        "Remove one line item from the user's active cart."
    }

    fn input_schema(&self) -> Value {
        schema_for::<RemoveItemInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<CartChangeOutput>()
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: RemoveItemInput = parse_input(input)?;
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;

        let cart = self
            .deps
            .store
            .remove_line_item(&ctx.owner_key, &input.line_item_id)
            .await?;
        to_output(&CartChangeOutput {
            message: format!(
                "Removed the item. Subtotal is now {}.",
                format_cents(cart.subtotal_cents)
            ),
            cart: CartView::from(&cart),
        })
    }
}

pub struct ClearCart {
    deps: CommerceDeps,
}

impl ClearCart {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for ClearCart {
    fn name(&self) -> &'static str {
        "clear_cart"
    }

    fn description(&self) -> &'static str {
        "Empty the user's cart by abandoning it. Requires the user's approval."
    }

    fn input_schema(&self) -> Value {
        schema_for::<NoInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<ClearCartOutput>()
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let NoInput {} = parse_input(input)?;
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;
        let abandoned = self.deps.store.abandon_active_cart(&ctx.owner_key).await?;
        to_output(&match abandoned {
            Some(cart) => ClearCartOutput {
                cleared: true,
                removed_items: cart.item_count(),
                message: "The cart has been cleared.".to_string(),
            },
            None => ClearCartOutput {
                cleared: false,
                removed_items: 0,
                message: "The cart was already empty.".to_string(),
            },
        })
    }
}
