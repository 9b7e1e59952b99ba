//! Model providers. A provider turns a conversation into a stream of
//! [`ModelChunk`]s: text deltas, complete tool calls and a finish marker.

pub mod openai_compatible;
pub mod scripted;
pub mod sse;
pub mod traits;
pub mod wire;

pub use openai_compatible::OpenAICompatibleProvider;
pub use scripted::{ScriptedProvider, ScriptedStep};
pub use traits::{
    ModelChunk, ModelProvider, ModelRequest, ModelStream, ProviderError, ToolCallRequest,
};
