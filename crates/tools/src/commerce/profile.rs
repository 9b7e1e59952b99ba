use async_trait::async_trait;
use concierge_store::{Feedback, Preferences, Sentiment};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::views::{FeedbackOutput, OrderView, PreferencesOutput, UserContextOutput};
use super::CommerceDeps;
use crate::contract::{parse_input, schema_for, to_output};
use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::traits::Tool;

const DEFAULT_RECENT_ORDERS: u32 = 3;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserContextInput {
    /// How many recent orders to include.
    #[serde(default)]
    #[schemars(range(min = 0, max = 10))]
    pub recent_orders: Option<u32>,
}

/// Partial update: only the fields present replace stored values.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    #[serde(default)]
    pub favorite_cuisines: Option<Vec<String>>,
    #[serde(default)]
    pub disliked_cuisines: Option<Vec<String>>,
    #[serde(default)]
    pub dietary_restrictions: Option<Vec<String>>,
    /// e.g. "mild", "medium", "hot".
    #[serde(default)]
    pub spice_level: Option<String>,
    /// e.g. "$", "$$", "$$$".
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PreferencesPatch {
    fn is_empty(&self) -> bool {
        self.favorite_cuisines.is_none()
            && self.disliked_cuisines.is_none()
            && self.dietary_restrictions.is_none()
            && self.spice_level.is_none()
            && self.budget_range.is_none()
            && self.notes.is_none()
    }

    fn apply(self, mut current: Preferences) -> Preferences {
        if let Some(v) = self.favorite_cuisines {
            current.favorite_cuisines = v;
        }
        if let Some(v) = self.disliked_cuisines {
            current.disliked_cuisines = v;
        }
        if let Some(v) = self.dietary_restrictions {
            current.dietary_restrictions = v;
        }
        if self.spice_level.is_some() {
            current.spice_level = self.spice_level;
        }
        if self.budget_range.is_some() {
            current.budget_range = self.budget_range;
        }
        if self.notes.is_some() {
            current.notes = self.notes;
        }
        current
    }
}

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSentiment {
    Positive,
    Neutral,
    Negative,
}

impl From<FeedbackSentiment> for Sentiment {
    fn from(value: FeedbackSentiment) -> Self {
        match value {
            FeedbackSentiment::Positive => Sentiment::Positive,
            FeedbackSentiment::Neutral => Sentiment::Neutral,
            FeedbackSentiment::Negative => Sentiment::Negative,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FeedbackInput {
    pub sentiment: FeedbackSentiment,
    #[serde(default)]
    pub notes: Option<String>,
}

pub struct GetUserContext {
    deps: CommerceDeps,
}

impl GetUserContext {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for GetUserContext {
    fn name(&self) -> &'static str {
        "get_user_context"
    }

    fn description(&self) -> &'static str {
        "Fetch the user's saved food preferences and their most recent orders."
    }

    fn input_schema(&self) -> Value {
        schema_for::<UserContextInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<UserContextOutput>()
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: UserContextInput = parse_input(input)?;
        let limit = input.recent_orders.unwrap_or(DEFAULT_RECENT_ORDERS) as usize;

        let preferences = self.deps.store.preferences(&ctx.owner_key).await?;
        let orders = self.deps.store.recent_orders(&ctx.owner_key, limit).await?;
        let cart = self.deps.store.active_cart(&ctx.owner_key).await?;

        to_output(&UserContextOutput {
            has_preferences: preferences.is_some(),
            preferences: preferences.unwrap_or_default().into(),
            recent_orders: orders.iter().map(OrderView::from).collect(),
            active_cart_items: cart.map(|c| c.item_count()).unwrap_or(0),
        })
    }
}

pub struct UpdatePreferences {
    deps: CommerceDeps,
}

impl UpdatePreferences {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for UpdatePreferences {
    fn name(&self) -> &'static str {
        "update_preferences"
    }

    fn description(&self) -> &'static str {
        "Save changes to the user's food preferences. Only provided fields change. \
         Requires the user's approval."
    }

    fn input_schema(&self) -> Value {
        schema_for::<PreferencesPatch>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<PreferencesOutput>()
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let patch: PreferencesPatch = parse_input(input)?;
        if patch.is_empty() {
            return Err(ToolError::Validation("no preference fields provided".into()));
        }
        let _guard = self.deps.locks.acquire(&ctx.owner_key).await?;

        let current = self
            .deps
            .store
            .preferences(&ctx.owner_key)
            .await?
            .unwrap_or_default();
        let saved = self
            .deps
            .store
            .upsert_preferences(&ctx.owner_key, patch.apply(current))
            .await?;
        info!(owner_key = %ctx.owner_key, "preferences updated");

        to_output(&PreferencesOutput {
            message: "Preferences saved.".to_string(),
            preferences: saved.into(),
        })
    }
}

pub struct LogFeedback {
    deps: CommerceDeps,
}

impl LogFeedback {
    pub fn new(deps: CommerceDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Tool for LogFeedback {
    fn name(&self) -> &'static str {
        "log_feedback"
    }

    fn description(&self) -> &'static str {
        "Record the user's feedback about a recommendation or order."
    }

    fn input_schema(&self) -> Value {
        schema_for::<FeedbackInput>()
    }

    fn output_schema(&self) -> Value {
        schema_for::<FeedbackOutput>()
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        let input: FeedbackInput = parse_input(input)?;
        self.deps
            .store
            .record_feedback(
                &ctx.owner_key,
                Feedback {
                    sentiment: input.sentiment.into(),
                    notes: input.notes,
                },
            )
            .await?;
        to_output(&FeedbackOutput { recorded: true })
    }
}
