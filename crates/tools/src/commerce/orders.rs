use async_trait::async_trait;
use concierge_store::NewLineItem;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::cart::default_quantity;
use super::views::OrderConfirmation;
use super::CommerceDeps;
use crate::contract::{parse_input, schema_for, to_output};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::traits::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOrderInput {
    /// Cart id to submit. Defaults to the active cart.
    #[serde(default)]
    pub cart_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseInput {
    /// Catalog item id from search_catalog.
    pub item_id: String,
    #[serde(default = "default_quantity")]
    #[schemars(range(min = 1, max = 50))]
    pub quantity: u32,
    #[serde(default)]
    pub option_ids: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct SubmitCartOrder {
    deps: CommerceDeps,
}

impl SubmitCartOrder {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SubmitCartOrder {
    fn name(&self) -> &'static str {
        "submit_cart_order"
    }

    fn description(&self) -> &'static str {
        "Place an order for everything in the user's active cart. Requires the user's approval."
    }

    fn input_schema(&self) -> Value {
        schema_for::<SubmitOrderInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<OrderConfirmation>()
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: SubmitOrderInput = parse_input(input)?;
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;

        let order = self
            .deps
            .store
            .submit_order(&ctx.owner_key, input.cart_id.as_deref())
            .await?;
        info!(
            owner_key = %ctx.owner_key,
            order_number = %order.order_number,
            "cart order submitted"
        );
        to_output(&OrderConfirmation::from(&order))
    }
}

/// One-step checkout of a single item. The order covers only that item;
/// whatever sits in the active cart stays there.
pub struct Purchase {
    deps: CommerceDeps,
}

impl Purchase {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for Purchase {
    fn name(&self) -> &'static str {
        "purchase"
    }

    fn description(&self) -> &'static str {
        "Buy one catalog item right away as its own order. The cart is not touched. \
         Requires the user's approval."
    }

    fn input_schema(&self) -> Value {
        schema_for::<PurchaseInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<OrderConfirmation>()
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: PurchaseInput = parse_input(input)?;
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;

        let order = self
            .deps
            .store
            .purchase_item(
                &ctx.owner_key,
                NewLineItem {
                    item_id: input.item_id,
                    quantity: input.quantity,
                    option_ids: input.option_ids,
                    notes: input.notes,
                },
            )
            .await?;
        info!(
            owner_key = %ctx.owner_key,
            order_number = %order.order_number,
            "purchase completed"
        );
        to_output(&OrderConfirmation::from(&order))
    }
}
