use jsonschema::Validator;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::contract;
use crate::error::ToolError;
use crate::traits::Tool;

/// A registered tool together with its compiled input and output contracts
/// and effective gating flag.
#[derive(Clone)]
pub struct ToolDefinition {
    tool: Arc<dyn Tool>,
    schema: Value,
    validator: Arc<Validator>,
    output_schema: Value,
    output_validator: Arc<Validator>,
    requires_approval: bool,
}

impl ToolDefinition {
    pub fn name(&self) -> &'static str {
        self.tool.name()
    }

    pub fn description(&self) -> &'static str {
        self.tool.description()
    }

    pub fn input_schema(&self) -> &Value {
        &self.schema
    }

    pub fn output_schema(&self) -> &Value {
        &self.output_schema
    }

    pub fn requires_approval(&self) -> bool {
        self.requires_approval
    }

    pub fn tool(&self) -> Arc<dyn Tool> {
        Arc::clone(&self.tool)
    }

    /// Check an input payload against the contract.
    pub fn validate(&self, input: &Value) -> Result<(), ToolError> {
        contract::check(&self.validator, input)
    }

    /// Check what the tool returned against its output contract.
    pub fn validate_output(&self, output: &Value) -> Result<(), ToolError> {
        contract::check_output(self.name(), &self.output_validator, output)
    }

    /// OpenAI function-calling shape.
    pub fn contract(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.schema
            }
        })
    }
}

/// Name -> definition map, resolved once at startup and shared read-only.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<&mut Self, ToolError> {
        let schema = tool.input_schema();
        let validator = contract::compile(tool.name(), &schema)?;
        let output_schema = tool.output_schema();
        let output_validator = contract::compile(tool.name(), &output_schema)?;
        let definition = ToolDefinition {
            requires_approval: tool.requires_approval(),
            tool,
            schema,
            validator: Arc::new(validator),
            output_schema,
            output_validator: Arc::new(output_validator),
        };
        let name = definition.name().to_string();
        if self.tools.insert(name.clone(), definition).is_some() {
            warn!(tool = %name, "Tool registered twice, keeping the latest definition");
        }
        Ok(self)
    }

    /// Override the gating flag of a registered tool.
    pub fn set_requires_approval(&mut self, name: &str, required: bool) -> Result<(), ToolError> {
        let definition = self
            .tools
            .get_mut(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        definition.requires_approval = required;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn resolve(&self, name: &str) -> Result<&ToolDefinition, ToolError> {
        self.get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn requires_approval(&self, name: &str) -> Result<bool, ToolError> {
        self.resolve(name).map(ToolDefinition::requires_approval)
    }

    pub fn list(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Contracts for every tool, in name order, ready to hand to the model.
    pub fn contracts(&self) -> Vec<Value> {
        self.tools.values().map(ToolDefinition::contract).collect()
    }
}
