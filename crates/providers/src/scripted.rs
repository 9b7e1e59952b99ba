use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;

use crate::traits::*;

/// One scripted model step.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Stream these chunks, then end.
    Reply(Vec<ModelChunk>),
    /// Stream these chunks, then fail mid-stream.
    Interrupted(Vec<ModelChunk>, ProviderError),
    /// Refuse to open the stream at all.
    Unavailable(ProviderError),
}

impl ScriptedStep {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedStep::Reply(vec![
            ModelChunk::TextDelta(text.into()),
            ModelChunk::Finish("stop".into()),
        ])
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ScriptedStep::Reply(vec![
            ModelChunk::ToolCall(ToolCallRequest {
                id: id.into(),
                name: name.into(),
                input,
            }),
            ModelChunk::Finish("tool_calls".into()),
        ])
    }
}

/// Deterministic provider that replays a script and records every request.
/// Once the script runs out it either repeats a fixed step (with tool call
/// ids made unique per call) or answers with an empty stop.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<ScriptedStep>>,
    repeat: Option<Vec<ModelChunk>>,
    chunk_delay: Option<Duration>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            repeat: None,
            chunk_delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(step: Vec<ModelChunk>) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before each chunk, to exercise timeouts and cancellation.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_step(&self, call: usize) -> ScriptedStep {
        if let Some(step) = self.script.lock().pop_front() {
            return step;
        }
        match &self.repeat {
            Some(chunks) => ScriptedStep::Reply(
                chunks
                    .iter()
                    .cloned()
                    .map(|chunk| match chunk {
                        ModelChunk::ToolCall(mut req) => {
                            req.id = format!("{}-{}", req.id, call);
                            ModelChunk::ToolCall(req)
                        }
                        other => other,
                    })
                    .collect(),
            ),
            None => ScriptedStep::Reply(vec![ModelChunk::Finish("stop".into())]),
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, ProviderError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request);
            requests.len()
        };

        let items: Vec<Result<ModelChunk, ProviderError>> = match self.next_step(call) {
            ScriptedStep::Unavailable(err) => return Err(err),
            ScriptedStep::Reply(chunks) => chunks.into_iter().map(Ok).collect(),
            ScriptedStep::Interrupted(chunks, err) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(err)))
                .collect(),
        };

        Ok(match self.chunk_delay {
            Some(delay) => Box::pin(stream::iter(items).then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })),
            None => Box::pin(stream::iter(items)),
        })
    }

    fn name(&self) -> &str {
        "Scripted"
    }
}
