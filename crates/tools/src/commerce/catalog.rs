use async_trait::async_trait;
use concierge_core::dollars_to_cents;
use concierge_store::CatalogQuery;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::views::{CatalogItemView, SearchCatalogOutput};
use super::CommerceDeps;
use crate::contract::{parse_input, schema_for, to_output};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::traits::Tool;

const DEFAULT_LIMIT: u32 = 5;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchCatalogInput {
    /// Free text matched against item names, descriptions and tags.
    #[serde(default)]
    pub query: Option<String>,
    /// Maximum unit price in dollars.
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Maximum number of results.
    #[serde(default)]
    #[schemars(range(min = 1, max = 20))]
    pub limit: Option<u32>,
}

pub struct SearchCatalog {
    deps: CommerceDeps,
}

impl SearchCatalog {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for SearchCatalog {
    fn name(&self) -> &'static str {
        "search_catalog"
    }

    fn description(&self) -> &'static str {
        "Search the menu catalog by keyword and optional maximum price. \
         Returns item ids to use with add_item_to_cart."
    }

    fn input_schema(&self) -> Value {
        schema_for::<SearchCatalogInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<SearchCatalogOutput>()
    }

    async fn execute(&self, _ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: SearchCatalogInput = parse_input(input)?;
        let max_price_cents = match input.max_price {
            Some(dollars) => Some(dollars_to_cents(dollars).ok_or_else(|| {
                ToolError::Validation(format!(
                    "maxPrice must be a non-negative amount, got {}",
                    dollars
                ))
            })?),
            None => None,
        };

        let query = CatalogQuery {
            text: input.query,
            max_price_cents,
            limit: input.limit.unwrap_or(DEFAULT_LIMIT) as usize,
        };
        let items = self.deps.store.search_catalog(&query).await?;

        to_output(&SearchCatalogOutput {
            count: items.len(),
            items: items.iter().map(CatalogItemView::from).collect(),
        })
    }
}
