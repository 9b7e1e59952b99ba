//! Concierge runtime
//!
//! Resolves human decisions on gated tool calls, executes approved and
//! ungated calls exactly once, drives the model for its continuation and
//! merges both into one outbound event stream.

pub mod config;
pub mod driver;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod merger;
pub mod metrics;
pub mod pipeline;
pub mod reconciler;
pub mod runner;
pub mod sink;

pub use config::{PipelineConfig, DEFAULT_SYSTEM_PROMPT};
pub use driver::{DriveOutcome, ModelDriver};
pub use error::RuntimeError;
pub use gate::GateAction;
pub use ledger::ExecutionLedger;
pub use merger::{merge, EventStream};
pub use pipeline::{ChatPipeline, ChatRequest, PipelineRun, RunOutcome};
pub use reconciler::{ReconcileReport, Reconciler};
pub use runner::ToolRunner;
pub use sink::EventSink;
