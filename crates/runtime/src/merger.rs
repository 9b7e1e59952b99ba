use concierge_core::{FinishReason, StreamEvent};
use futures::stream::{self, Stream};
use std::collections::HashSet;
use std::pin::Pin;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

enum Phase {
    Reconciling,
    Generating,
    Finished,
}

struct MergeState {
    start: Option<StreamEvent>,
    phase: Phase,
    reconciliation: UnboundedReceiver<StreamEvent>,
    model: UnboundedReceiver<StreamEvent>,
    resolved: HashSet<String>,
}

/// Merge reconciliation and model events into one client stream.
///
/// `start` goes first, then reconciliation events as they are produced until
/// that channel closes, then model events. At most one tool result is
/// forwarded per tool call. The stream ends after `done`; a model channel
/// that closes without one gets a synthesized `done{error}`.
pub fn merge(
    start: StreamEvent,
    reconciliation: UnboundedReceiver<StreamEvent>,
    model: UnboundedReceiver<StreamEvent>,
) -> EventStream {
    let state = MergeState {
        start: Some(start),
        phase: Phase::Reconciling,
        reconciliation,
        model,
        resolved: HashSet::new(),
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        if let Some(start) = st.start.take() {
            return Some((start, st));
        }
        loop {
            let event = match st.phase {
                Phase::Finished => return None,
                Phase::Reconciling => match st.reconciliation.recv().await {
                    Some(event) => event,
                    None => {
                        st.phase = Phase::Generating;
                        continue;
                    }
                },
                Phase::Generating => match st.model.recv().await {
                    Some(event) => event,
                    None => {
                        st.phase = Phase::Finished;
                        let done = StreamEvent::Done {
                            finish_reason: FinishReason::Error,
                        };
                        return Some((done, st));
                    }
                },
            };

            if let Some(tool_call_id) = event.resolved_tool_call() {
                if !st.resolved.insert(tool_call_id.to_string()) {
                    debug!(tool_call_id, "Dropping duplicate tool result");
                    continue;
                }
            }
            if event.is_done() {
                st.phase = Phase::Finished;
            }
            return Some((event, st));
        }
    }))
}
