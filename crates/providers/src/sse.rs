//! Server-sent-event decoding for streamed chat completions.

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

use crate::traits::{ModelChunk, ModelStream, ProviderError, ToolCallRequest};

/// Splits a byte stream into SSE `data:` payloads. Bytes are buffered until a
/// full line arrives, so multi-byte characters split across network chunks
/// decode correctly.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches(&['\n', '\r'][..]), &mut events);
        }
        events
    }

    /// Flush whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let rest = String::from_utf8_lossy(&rest);
            self.line(rest.trim_end_matches(&['\n', '\r'][..]), &mut events);
        }
        self.line("", &mut events);
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(self.data.join("\n"));
                self.data.clear();
            }
        } else if let Some(rest) = line.strip_prefix("data:") {
            self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    /// Arguments that are not valid JSON are passed through as a string so
    /// contract validation rejects them with a visible error.
    fn into_request(self) -> ToolCallRequest {
        let input = if self.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or(Value::String(self.arguments))
        };
        let id = if self.id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            self.id
        };
        ToolCallRequest {
            id,
            name: self.name,
            input,
        }
    }
}

/// Accumulates chat-completion deltas. Tool call fragments are keyed by
/// their index and released whole when the choice finishes.
#[derive(Default)]
pub struct DeltaAssembler {
    calls: BTreeMap<u64, PartialCall>,
    finished: bool,
}

impl DeltaAssembler {
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn absorb(&mut self, payload: &str) -> Result<Vec<ModelChunk>, ProviderError> {
        let payload = payload.trim();
        if payload == "[DONE]" {
            return Ok(self.finish(None));
        }

        let value: Value =
            serde_json::from_str(payload).map_err(|e| ProviderError::Parse(e.to_string()))?;
        if let Some(error) = value.get("error") {
            return Err(ProviderError::Api(error.to_string()));
        }

        let mut chunks = Vec::new();
        let Some(choice) = value["choices"].get(0) else {
            return Ok(chunks);
        };

        let delta = &choice["delta"];
        if let Some(text) = delta["content"].as_str() {
            if !text.is_empty() {
                chunks.push(ModelChunk::TextDelta(text.to_string()));
            }
        }
        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let index = call["index"].as_u64().unwrap_or(0);
                let entry = self.calls.entry(index).or_default();
                if let Some(id) = call["id"].as_str() {
                    if entry.id.is_empty() {
                        entry.id = id.to_string();
                    }
                }
                if let Some(name) = call["function"]["name"].as_str() {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = call["function"]["arguments"].as_str() {
                    entry.arguments.push_str(arguments);
                }
            }
        }
        if let Some(reason) = choice["finish_reason"].as_str() {
            chunks.extend(self.finish(Some(reason)));
        }
        Ok(chunks)
    }

    pub fn finish(&mut self, reason: Option<&str>) -> Vec<ModelChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut chunks: Vec<ModelChunk> = std::mem::take(&mut self.calls)
            .into_values()
            .map(|call| ModelChunk::ToolCall(call.into_request()))
            .collect();
        chunks.push(ModelChunk::Finish(reason.unwrap_or("stop").to_string()));
        chunks
    }
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    assembler: DeltaAssembler,
    pending: VecDeque<ModelChunk>,
    done: bool,
}

impl<S> DecodeState<S> {
    fn absorb_all(&mut self, payloads: Vec<String>) -> Result<(), ProviderError> {
        for payload in payloads {
            let chunks = self.assembler.absorb(&payload)?;
            self.pending.extend(chunks);
        }
        if self.assembler.is_finished() {
            self.done = true;
        }
        Ok(())
    }
}

/// Turn a raw SSE byte stream into model chunks.
pub fn decode_stream<S>(bytes: S) -> ModelStream
where
    S: Stream<Item = Result<Vec<u8>, String>> + Send + Unpin + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        assembler: DeltaAssembler::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.done {
                return None;
            }
            let result = match st.bytes.next().await {
                Some(Ok(bytes)) => {
                    let payloads = st.decoder.push(&bytes);
                    st.absorb_all(payloads)
                }
                Some(Err(e)) => Err(ProviderError::Stream(e)),
                None => {
                    let payloads = st.decoder.finish();
                    let result = st.absorb_all(payloads);
                    let tail = st.assembler.finish(None);
                    st.pending.extend(tail);
                    st.done = true;
                    result
                }
            };
            if let Err(e) = result {
                st.done = true;
                st.pending.clear();
                return Some((Err(e), st));
            }
        }
    }))
}
