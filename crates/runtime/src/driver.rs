//! Model driver: the step loop that streams model output into the
//! assistant message and turns proposed tool calls into parts.

use concierge_core::{FinishReason, Message, Part, StreamEvent, ToolPart, ToolState};
use concierge_providers::{ModelChunk, ModelProvider, ModelRequest, ToolCallRequest};
use futures::future::join_all;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::gate;
use crate::metrics::{self, MetricTimer, MODEL_STEP_LATENCY};
use crate::runner::ToolRunner;
use crate::sink::EventSink;

/// Text surfaced to the client when the model provider fails. The real
/// error only goes to the log.
pub const UPSTREAM_FAILURE_TEXT: &str =
    "The assistant is temporarily unavailable. Please try again in a moment.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    pub finish_reason: FinishReason,
    /// Model calls made.
    pub steps: usize,
}

/// Runs model steps until the model stops calling tools, a gated call needs
/// the user, or a limit is hit. Every limit ends the run gracefully with
/// whatever content was produced so far.
pub struct ModelDriver {
    provider: Arc<dyn ModelProvider>,
    runner: Arc<ToolRunner>,
    system_prompt: String,
    step_budget: usize,
}

enum StepEnd {
    /// The model proposed tool calls; go round again.
    Continue,
    Finish(FinishReason),
}

impl ModelDriver {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        runner: Arc<ToolRunner>,
        system_prompt: impl Into<String>,
        step_budget: usize,
    ) -> Self {
        Self {
            provider,
            runner,
            system_prompt: system_prompt.into(),
            step_budget: step_budget.max(1),
        }
    }

    /// Continue `message` given the preceding `context`. New parts are only
    /// ever appended after the parts `message` already has.
    pub async fn drive(
        &self,
        owner_key: &str,
        context: &[Message],
        message: &mut Message,
        sink: &EventSink,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> DriveOutcome {
        let mut seen_ids: HashSet<String> = context
            .iter()
            .chain(std::iter::once(&*message))
            .flat_map(|m| m.tool_parts().map(|p| p.tool_call_id.clone()))
            .collect();

        let mut steps = 0;
        loop {
            if steps >= self.step_budget {
                warn!(owner_key, steps, "Step budget exhausted");
                metrics::increment_step_budget_exhausted();
                return DriveOutcome {
                    finish_reason: FinishReason::StepBudget,
                    steps,
                };
            }
            if cancel.is_cancelled() {
                return DriveOutcome {
                    finish_reason: FinishReason::Cancelled,
                    steps,
                };
            }
            if Instant::now() >= deadline {
                return DriveOutcome {
                    finish_reason: FinishReason::Timeout,
                    steps,
                };
            }

            steps += 1;
            debug!(owner_key, step = steps, budget = self.step_budget, "Model step");
            let end = self
                .step(owner_key, context, message, &mut seen_ids, sink, deadline, cancel)
                .await;

            match end {
                StepEnd::Continue => continue,
                StepEnd::Finish(finish_reason) => {
                    info!(owner_key, steps, ?finish_reason, "Model run finished");
                    return DriveOutcome { finish_reason, steps };
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn step(
        &self,
        owner_key: &str,
        context: &[Message],
        message: &mut Message,
        seen_ids: &mut HashSet<String>,
        sink: &EventSink,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> StepEnd {
        let _timer = MetricTimer::new(MODEL_STEP_LATENCY);

        let mut messages = context.to_vec();
        messages.push(message.clone());
        let request = ModelRequest {
            system_prompt: self.system_prompt.clone(),
            messages,
            tools: self.runner.registry().contracts(),
        };

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StepEnd::Finish(FinishReason::Cancelled),
            _ = sleep_until(deadline) => return StepEnd::Finish(FinishReason::Timeout),
            opened = self.provider.stream(request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return upstream_failure(owner_key, &e.to_string(), sink),
        };

        let mut text_index: Option<usize> = None;
        let mut proposed = 0;
        let mut runnable = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return StepEnd::Finish(FinishReason::Cancelled),
                _ = sleep_until(deadline) => return StepEnd::Finish(FinishReason::Timeout),
                next = stream.next() => next,
            };

            match next {
                None | Some(Ok(ModelChunk::Finish(_))) => break,
                Some(Err(e)) => return upstream_failure(owner_key, &e.to_string(), sink),
                Some(Ok(ModelChunk::TextDelta(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    let appended = match text_index.and_then(|i| message.parts.get_mut(i)) {
                        Some(Part::Text { text: existing }) => {
                            existing.push_str(&text);
                            true
                        }
                        _ => false,
                    };
                    if !appended {
                        message.parts.push(Part::text(text.clone()));
                        text_index = Some(message.parts.len() - 1);
                    }
                    sink.emit(StreamEvent::TextDelta { text });
                }
                Some(Ok(ModelChunk::ToolCall(call))) => {
                    proposed += 1;
                    text_index = None;
                    let part = self.propose(owner_key, call, seen_ids, sink);
                    if part.state == ToolState::InputAvailable {
                        runnable.push((message.parts.len(), part.clone()));
                    }
                    message.parts.push(Part::Tool(part));
                }
            }
        }

        if !runnable.is_empty() {
            // Tools already dispatched keep running if the client leaves;
            // only the deadline stops this run from waiting on them.
            let runner = &self.runner;
            let executions = join_all(runnable.into_iter().map(|(index, part)| async move {
                (index, runner.execute(owner_key, part, sink).await)
            }));
            let settled = tokio::select! {
                settled = executions => settled,
                _ = sleep_until(deadline) => return StepEnd::Finish(FinishReason::Timeout),
            };
            for (index, part) in settled {
                if let Some(slot) = message.parts.get_mut(index) {
                    *slot = Part::Tool(part);
                }
            }
        }

        if message
            .tool_parts()
            .any(|p| p.state == ToolState::AwaitingApproval)
        {
            StepEnd::Finish(FinishReason::AwaitingApproval)
        } else if proposed == 0 {
            StepEnd::Finish(FinishReason::Stop)
        } else {
            StepEnd::Continue
        }
    }

    /// Turn a model tool call into a part. Calls that name an unknown tool or
    /// break the tool's contract are settled as errors on the spot.
    fn propose(
        &self,
        owner_key: &str,
        call: ToolCallRequest,
        seen_ids: &mut HashSet<String>,
        sink: &EventSink,
    ) -> ToolPart {
        let tool_call_id = if call.id.trim().is_empty() || seen_ids.contains(&call.id) {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            call.id
        };
        seen_ids.insert(tool_call_id.clone());

        sink.emit(StreamEvent::ToolInputAvailable {
            tool_call_id: tool_call_id.clone(),
            tool_name: call.name.clone(),
            input: call.input.clone(),
        });

        let mut part =
            ToolPart::new(tool_call_id, call.name, call.input, ToolState::InputAvailable);
        let checked = self
            .runner
            .registry()
            .resolve(&part.tool_name)
            .and_then(|definition| {
                definition
                    .validate(&part.input)
                    .map(|()| definition.requires_approval())
            });

        match checked {
            Ok(true) => {
                info!(
                    owner_key,
                    tool = %part.tool_name,
                    tool_call_id = %part.tool_call_id,
                    "Gated tool call awaits approval"
                );
                gate::await_approval(&mut part);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(owner_key, tool = %part.tool_name, "Rejected tool call: {}", e);
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

fn upstream_failure(owner_key: &str, error: &str, sink: &EventSink) -> StepEnd {
    warn!(owner_key, "Model provider failed: {}", error);
    metrics::increment_upstream_errors();
    sink.emit(StreamEvent::Error {
        error_text: UPSTREAM_FAILURE_TEXT.to_string(),
    });
    StepEnd::Finish(FinishReason::Error)
}
