//! Tool runner: executes one part through the ledger and settles it.

use concierge_core::{StreamEvent, ToolPart};
use concierge_tools::{ExecutionContext, ToolDispatcher, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

use crate::gate;
use crate::ledger::ExecutionLedger;
use crate::metrics::{MetricTimer, TOOL_EXECUTION_LATENCY};
use crate::sink::EventSink;

/// Executes tool parts through the ledger, so a part is executed at most
/// once per owner no matter how many requests carry it.
pub struct ToolRunner {
    dispatcher: Arc<ToolDispatcher>,
    ledger: Arc<ExecutionLedger>,
    tool_timeout_ms: u64,
}

impl ToolRunner {
    pub fn new(
        dispatcher: Arc<ToolDispatcher>,
        ledger: Arc<ExecutionLedger>,
        tool_timeout_ms: u64,
    ) -> Self {
        Self {
            dispatcher,
            ledger,
            tool_timeout_ms,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.dispatcher.registry()
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        &self.ledger
    }

    /// Execute `part`, settle it with the outcome and emit the matching
    /// output event.
    pub async fn execute(&self, owner_key: &str, mut part: ToolPart, sink: &EventSink) -> ToolPart {
        let _timer = MetricTimer::new(TOOL_EXECUTION_LATENCY);

        let dispatcher = self.dispatcher.clone();
        let ctx = ExecutionContext::new(owner_key, part.tool_call_id.clone(), self.tool_timeout_ms);
        let tool_name = part.tool_name.clone();
        let input = part.input.clone();

        let (outcome, fresh) = self
            .ledger
            .run_once(owner_key, &part.tool_call_id, move || async move {
                dispatcher.dispatch(ctx, &tool_name, input).await
            })
            .await;

        if !fresh {
            info!(
                owner_key,
                tool_call_id = %part.tool_call_id,
                "Replaying recorded tool outcome"
            );
        }

        match outcome {
            Ok(output) => {
                gate::complete(&mut part, output.clone());
                sink.emit(StreamEvent::ToolOutputAvailable {
                    tool_call_id: part.tool_call_id.clone(),
                    output,
                });
            }
            Err(e) => {
                warn!(
                    tool = %part.tool_name,
                    tool_call_id = %part.tool_call_id,
                    "Tool failed: {}",
                    e
                );
                let error_text = e.to_string();
                gate::fail(&mut part, error_text.clone());
                sink.emit(StreamEvent::ToolOutputError {
                    tool_call_id: part.tool_call_id.clone(),
                    error_text,
                });
            }
        }
        part
    }
}
