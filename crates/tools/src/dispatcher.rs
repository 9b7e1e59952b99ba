use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use crate::error::ToolError;
use crate::execution_context::ExecutionContext;
use crate::registry::ToolRegistry;
use crate::traits::{AuditLogger, Tool};

/// Looks a tool up, validates its input, runs it with timeout and panic
/// isolation, then holds the output to the tool's output contract. Gating
/// is not decided here; callers only dispatch calls that are cleared to run.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    audit: Arc<dyn AuditLogger>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, audit: Arc<dyn AuditLogger>) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn dispatch(
        &self,
        ctx: ExecutionContext,
        tool_name: &str,
        input: Value,
    ) -> Result<Value, ToolError> {
        info!(
            tool = tool_name,
            owner_key = %ctx.owner_key,
            tool_call_id = %ctx.tool_call_id,
            "Dispatching tool"
        );
        let started = Instant::now();

        let result = match self.registry.resolve(tool_name) {
            Ok(definition) => match definition.validate(&input) {
                Ok(()) => self
                    .execute_with_protection(definition.tool(), ctx.clone(), input.clone())
                    .await
                    .and_then(|output| {
                        definition.validate_output(&output)?;
                        Ok(output)
                    }),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        self.log_audit_isolated(&ctx, tool_name, &input, &result, started.elapsed());
        result
    }

    /// The tool body runs in its own task: a panic becomes
    /// [`ToolError::Internal`], and a caller that stops waiting does not
    /// abort a write that is already under way.
    async fn execute_with_protection(
        &self,
        tool: Arc<dyn Tool>,
        ctx: ExecutionContext,
        input: Value,
    ) -> Result<Value, ToolError> {
        let timeout_ms = ctx.timeout_ms;
        let handle = tokio::spawn(async move { tool.execute(ctx, input).await });

        match timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Tool execution panicked");
                } else {
                    error!("Tool execution cancelled");
                }
                Err(ToolError::Internal)
            }
            Err(_) => {
                warn!("Tool execution timed out after {}ms", timeout_ms);
                Err(ToolError::Timeout(timeout_ms))
            }
        }
    }

    fn log_audit_isolated(
        &self,
        ctx: &ExecutionContext,
        tool_name: &str,
        input: &Value,
        result: &Result<Value, ToolError>,
        elapsed: Duration,
    ) {
        let entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "audit_ref": ctx.audit_ref,
            "owner": ctx.owner_key,
            "tool_call_id": ctx.tool_call_id,
            "tool": tool_name,
            "input": input,
            "duration_ms": elapsed.as_millis() as u64,
            "result": match result {
                Ok(_) => json!({"success": true}),
                Err(e) => json!({"success": false, "error": e.to_string()}),
            }
        });

        // Fire and forget
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            audit.log(entry).await;
        });
    }
}
