//! Reconciler: settles the trailing message of an inbound conversation.
//!
//! Declines get the sentinel, approved and ungated calls execute through the
//! ledger, and every result lands at the index its part already occupies.

use concierge_core::{Message, Part, StreamEvent, ToolState};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::gate::{self, GateAction};
use crate::metrics;
use crate::runner::ToolRunner;
use crate::sink::EventSink;

/// What one reconciliation pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub executed: usize,
    pub declined: usize,
    pub rejected: usize,
    /// Parts still waiting on a decision after the pass.
    pub awaiting: usize,
}

/// Applies client decisions to the trailing message of a conversation and
/// executes everything that is cleared to run.
pub struct Reconciler {
    runner: Arc<ToolRunner>,
}

impl Reconciler {
    pub fn new(runner: Arc<ToolRunner>) -> Self {
        Self { runner }
    }

    /// Reconcile `message` in place. Running it again over its own result is
    /// a no-op. Executions run concurrently and are written back at their
    /// original index.
    pub async fn reconcile(
        &self,
        owner_key: &str,
        message: &mut Message,
        sink: &EventSink,
    ) -> ReconcileReport {
        let registry = self.runner.registry();
        let ledger = self.runner.ledger();
        let mut report = ReconcileReport::default();
        let mut pending = Vec::new();

        for (index, part) in message.parts.iter_mut().enumerate() {
            let Part::Tool(tool) = part else {
                continue;
            };
            let gated = registry.requires_approval(&tool.tool_name).ok();
            let recorded = ledger.contains(owner_key, &tool.tool_call_id);

            match gate::evaluate(tool, gated.unwrap_or(true), recorded) {
                GateAction::Untouched => {
                    if tool.state == ToolState::AwaitingApproval {
                        report.awaiting += 1;
                    }
                }
                GateAction::Decline => {
                    info!(
                        owner_key,
                        tool = %tool.tool_name,
                        tool_call_id = %tool.tool_call_id,
                        "Tool call declined"
                    );
                    gate::decline(tool);
                    metrics::increment_declined_calls();
                    report.declined += 1;
                    if let Some(output) = tool.output.clone() {
                        sink.emit(StreamEvent::ToolOutputAvailable {
                            tool_call_id: tool.tool_call_id.clone(),
                            output,
                        });
                    }
                }
                GateAction::AwaitApproval | GateAction::Execute if gated.is_none() => {
                    let error_text = format!("Unknown tool: {}", tool.tool_name);
                    warn!(owner_key, tool_call_id = %tool.tool_call_id, "{}", error_text);
                    gate::fail(tool, error_text.clone());
                    report.rejected += 1;
                    sink.emit(StreamEvent::ToolOutputError {
                        tool_call_id: tool.tool_call_id.clone(),
                        error_text,
                    });
                }
                GateAction::AwaitApproval => {
                    debug!(tool_call_id = %tool.tool_call_id, "Parking gated call for approval");
                    gate::await_approval(tool);
                    report.awaiting += 1;
                }
                GateAction::Execute => {
                    if tool.state == ToolState::AwaitingApproval {
                        gate::approve(tool);
                    }
                    pending.push((index, tool.clone()));
                }
            }
        }

        report.executed = pending.len();
        let runner = &self.runner;
        let settled = join_all(pending.into_iter().map(|(index, part)| async move {
            (index, runner.execute(owner_key, part, sink).await)
        }))
        .await;

        for (index, part) in settled {
            if let Some(slot) = message.parts.get_mut(index) {
                *slot = Part::Tool(part);
            }
        }

        if report != ReconcileReport::default() {
            info!(
                owner_key,
                executed = report.executed,
                declined = report.declined,
                rejected = report.rejected,
                awaiting = report.awaiting,
                "Reconciled message"
            );
        }
        report
    }
}
