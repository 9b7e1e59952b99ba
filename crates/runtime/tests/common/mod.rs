#![allow(dead_code)]

use async_trait::async_trait;
use concierge_core::{Decision, Message, Part, Role, ToolPart, ToolState};
use concierge_providers::{ModelProvider, ScriptedProvider, ScriptedStep};
use concierge_runtime::{ChatPipeline, ChatRequest, PipelineConfig};
use concierge_tools::{
    ExecutionContext, Tool, ToolDispatcher, ToolError, ToolRegistry, TracingAuditLogger,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const OWNER: &str = "table-7";

/// Counts executions and echoes its input. An optional `delayMs` input
/// makes it sleep first.
pub struct SpyTool {
    name: &'static str,
    gated: bool,
    calls: AtomicUsize,
}

impl SpyTool {
    pub fn new(name: &'static str, gated: bool) -> Arc<Self> {
        Arc::new(Self {
            name,
            gated,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for SpyTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Test tool"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "itemId": {"type": "string"},
                "delayMs": {"type": "integer", "minimum": 0}
            }
        })
    }

    fn output_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool": {"type": "string"},
                "owner": {"type": "string"},
                "input": {"type": "object"},
                "call": {"type": "integer", "minimum": 1}
            },
            "required": ["tool", "owner", "call"]
        })
    }

    fn requires_approval(&self) -> bool {
        self.gated
    }

    async fn execute(&self, ctx: ExecutionContext, input: Value) -> Result<Value, ToolError> {
        if let Some(ms) = input.get("delayMs").and_then(Value::as_u64) {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({
            "tool": self.name,
            "owner": ctx.owner_key,
            "input": input,
            "call": call,
        }))
    }
}

pub struct FailingTool;

#[async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &'static str {
        "explode"
    }

    fn description(&self) -> &'static str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }

    fn output_schema(&self) -> Value {
        json!({"type": "object"})
    }

    async fn execute(&self, _ctx: ExecutionContext, _input: Value) -> Result<Value, ToolError> {
        Err(ToolError::Execution("kitchen closed".into()))
    }
}

pub struct Harness {
    pub pipeline: Arc<ChatPipeline>,
    pub provider: Arc<ScriptedProvider>,
    pub purchase: Arc<SpyTool>,
    pub lookup: Arc<SpyTool>,
    pub dispatcher: Arc<ToolDispatcher>,
}

pub fn dispatcher() -> (Arc<ToolDispatcher>, Arc<SpyTool>, Arc<SpyTool>) {
    let purchase = SpyTool::new("purchase", true);
    let lookup = SpyTool::new("lookup", false);

    let mut registry = ToolRegistry::new();
    registry.register(purchase.clone()).unwrap();
    registry.register(lookup.clone()).unwrap();
    registry.register(Arc::new(FailingTool)).unwrap();

    let dispatcher = Arc::new(ToolDispatcher::new(
        Arc::new(registry),
        Arc::new(TracingAuditLogger),
    ));
    (dispatcher, purchase, lookup)
}

pub fn harness(provider: ScriptedProvider) -> Harness {
    harness_with(provider, PipelineConfig::default())
}

pub fn harness_with(provider: ScriptedProvider, config: PipelineConfig) -> Harness {
    let (dispatcher, purchase, lookup) = dispatcher();
    let provider = Arc::new(provider);
    let pipeline = Arc::new(ChatPipeline::new(
        provider.clone() as Arc<dyn ModelProvider>,
        dispatcher.clone(),
        config,
    ));
    Harness {
        pipeline,
        provider,
        purchase,
        lookup,
        dispatcher,
    }
}

pub fn scripted(steps: Vec<ScriptedStep>) -> ScriptedProvider {
    ScriptedProvider::new(steps)
}

pub fn request(messages: Vec<Message>) -> ChatRequest {
    ChatRequest {
        owner_key: OWNER.into(),
        messages,
    }
}

/// A user asking to buy, followed by the assistant's gated proposal.
pub fn pending_purchase(decision: Option<Decision>) -> Vec<Message> {
    let mut part = ToolPart::new(
        "call_buy",
        "purchase",
        json!({"itemId": "taco"}),
        ToolState::AwaitingApproval,
    );
    part.decision = decision;
    vec![
        Message::user("buy the taco"),
        Message {
            id: "assistant-1".into(),
            role: Role::Assistant,
            parts: vec![Part::text("I can buy that for you."), Part::Tool(part)],
        },
    ]
}
