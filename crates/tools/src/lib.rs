//! Tool registry, contracts and dispatch, plus the commerce tool set.

pub mod commerce;
pub mod contract;
pub mod dispatcher;
pub mod error;
pub mod execution_context;
pub mod registry;
pub mod traits;

pub use commerce::{commerce_registry, CommerceDeps};
pub use dispatcher::ToolDispatcher;
pub use error::ToolError;
pub use execution_context::ExecutionContext;
pub use registry::{ToolDefinition, ToolRegistry};
pub use traits::{AuditLogger, Tool, TracingAuditLogger};
