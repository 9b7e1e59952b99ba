//! Chat pipeline: one request in, one ordered event stream out.

use concierge_core::{
    new_message_id, validate_conversation, FinishReason, Message, Role, StreamEvent,
};
use concierge_providers::ModelProvider;
use concierge_tools::ToolDispatcher;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::driver::{DriveOutcome, ModelDriver};
use crate::error::RuntimeError;
use crate::ledger::ExecutionLedger;
use crate::merger::{merge, EventStream};
use crate::metrics::{MetricTimer, PIPELINE_DURATION};
use crate::reconciler::Reconciler;
use crate::runner::ToolRunner;
use crate::sink::EventSink;

/// One inbound chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub owner_key: String,
    pub messages: Vec<Message>,
}

/// The conversation as it stands after a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub messages: Vec<Message>,
    pub finish_reason: FinishReason,
    pub steps: usize,
}

/// A run in progress. Dropping the event stream cancels further model
/// steps; tool executions already dispatched still complete.
pub struct PipelineRun {
    pub message_id: String,
    events: EventStream,
    outcome: oneshot::Receiver<RunOutcome>,
}

impl PipelineRun {
    pub fn into_events(self) -> EventStream {
        self.events
    }

    pub fn into_parts(self) -> (EventStream, oneshot::Receiver<RunOutcome>) {
        (self.events, self.outcome)
    }

    /// Drain the stream, then wait for the final conversation.
    pub async fn collect(self) -> (Vec<StreamEvent>, Option<RunOutcome>) {
        let events = self.events.collect().await;
        (events, self.outcome.await.ok())
    }
}

/// Reconcile, then generate: the entry point for one chat request.
pub struct ChatPipeline {
    reconciler: Reconciler,
    driver: ModelDriver,
    runner: Arc<ToolRunner>,
    config: PipelineConfig,
}

impl ChatPipeline {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        dispatcher: Arc<ToolDispatcher>,
        config: PipelineConfig,
    ) -> Self {
        let ledger = Arc::new(ExecutionLedger::new(config.ledger_capacity));
        let runner = Arc::new(ToolRunner::new(dispatcher, ledger, config.tool_timeout_ms));
        Self {
            reconciler: Reconciler::new(runner.clone()),
            driver: ModelDriver::new(
                provider,
                runner.clone(),
                config.system_prompt.clone(),
                config.step_budget,
            ),
            runner,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ExecutionLedger> {
        self.runner.ledger()
    }

    /// Validate the request and start a run in the background.
    ///
    /// If the conversation ends with an assistant message, that message is
    /// reconciled and then continued; otherwise a new assistant message is
    /// started. When parts are still waiting on the user after
    /// reconciliation, the model is not called.
    pub fn start(self: &Arc<Self>, request: ChatRequest) -> Result<PipelineRun, RuntimeError> {
        let owner_key = request.owner_key.trim().to_string();
        if owner_key.is_empty() {
            return Err(RuntimeError::InvalidRequest("ownerKey is required".into()));
        }
        validate_conversation(&request.messages)?;

        let mut context = request.messages;
        let mut message = match context.last() {
            Some(last) if last.role == Role::Assistant => context.pop(),
            _ => None,
        }
        .unwrap_or_else(|| Message::assistant(new_message_id()));
        let message_id = message.id.clone();

        let (recon_sink, recon_rx) = EventSink::channel();
        let (model_sink, model_rx) = EventSink::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let guard = cancel.clone().drop_guard();
        let merged = merge(
            StreamEvent::Start {
                message_id: message_id.clone(),
            },
            recon_rx,
            model_rx,
        );
        // The guard lives exactly as long as the client's stream.
        let events: EventStream = Box::pin(merged.map(move |event| {
            let _ = &guard;
            event
        }));

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let _timer = MetricTimer::new(PIPELINE_DURATION);
            let deadline = Instant::now() + pipeline.config.wall_clock;
            info!(owner_key = %owner_key, message_id = %message.id, "Pipeline run started");

            // Executions cut off here keep running in the ledger and settle
            // on the next request that carries them.
            let reconciled = tokio::select! {
                report = pipeline.reconciler.reconcile(&owner_key, &mut message, &recon_sink) => {
                    Some(report)
                }
                _ = tokio::time::sleep_until(deadline) => None,
            };
            drop(recon_sink);

            let outcome = match reconciled {
                None => {
                    warn!(owner_key = %owner_key, "Wall-clock ceiling hit during reconciliation");
                    DriveOutcome {
                        finish_reason: FinishReason::Timeout,
                        steps: 0,
                    }
                }
                Some(report) if report.awaiting > 0 => {
                    info!(
                        owner_key = %owner_key,
                        awaiting = report.awaiting,
                        "Waiting on user decisions"
                    );
                    DriveOutcome {
                        finish_reason: FinishReason::AwaitingApproval,
                        steps: 0,
                    }
                }
                Some(_) => {
                    pipeline
                        .driver
                        .drive(&owner_key, &context, &mut message, &model_sink, deadline, &cancel)
                        .await
                }
            };

            model_sink.emit(StreamEvent::Done {
                finish_reason: outcome.finish_reason,
            });
            info!(
                owner_key = %owner_key,
                finish_reason = ?outcome.finish_reason,
                steps = outcome.steps,
                "Pipeline run finished"
            );

            context.push(message);
            // The receiver is optional; HTTP callers only read the stream.
            let _ = outcome_tx.send(RunOutcome {
                messages: context,
                finish_reason: outcome.finish_reason,
                steps: outcome.steps,
            });
        });

        Ok(PipelineRun {
            message_id,
            events,
            outcome: outcome_rx,
        })
    }
}
