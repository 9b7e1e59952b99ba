//! JSON Schema contracts for tool inputs and outputs.

use jsonschema::Validator;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ToolError;

/// Generate a schema from a typed input or output struct.
pub fn schema_for<T: JsonSchema>() -> Value {
    let mut schema = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| json!({"type": "object", "properties": {}}));
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    schema
}

/// Deserialize an already-validated input into its typed form.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::Validation(e.to_string()))
}

/// Serialize a typed output into the value handed back to the model.
pub fn to_output<T: Serialize>(output: &T) -> Result<Value, ToolError> {
    serde_json::to_value(output).map_err(|e| ToolError::Execution(e.to_string()))
}

pub(crate) fn compile(tool: &str, schema: &Value) -> Result<Validator, ToolError> {
    Validator::new(schema).map_err(|e| ToolError::Contract {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn violations(validator: &Validator, value: &Value) -> Option<String> {
    if validator.is_valid(value) {
        return None;
    }
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    Some(errors.join("; "))
}

pub(crate) fn check(validator: &Validator, input: &Value) -> Result<(), ToolError> {
    match violations(validator, input) {
        None => Ok(()),
        Some(reason) => Err(ToolError::Validation(reason)),
    }
}

/// A tool that breaks its own output contract is a defect in the tool, not
/// in the caller's input.
pub(crate) fn check_output(
    tool: &str,
    validator: &Validator,
    output: &Value,
) -> Result<(), ToolError> {
    match violations(validator, output) {
        None => Ok(()),
        Some(reason) => Err(ToolError::Contract {
            tool: tool.to_string(),
            reason: format!("output {}", reason),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    #[allow(dead_code)]
    struct Sample {
        item_id: String,
        #[schemars(range(min = 1))]
        quantity: u32,
        #[serde(default)]
        notes: Option<String>,
    }

    #[test]
    fn test_schema_for_uses_serde_names() {
        let schema = schema_for::<Sample>();
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"].get("itemId").is_some());
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("itemId")));
        assert!(!required.contains(&json!("notes")));
    }

    #[test]
    fn test_check_reports_violations() {
        let schema = schema_for::<Sample>();
        let validator = compile("sample", &schema).unwrap();
        assert!(check(&validator, &json!({"itemId": "a", "quantity": 2})).is_ok());

        let err = check(&validator, &json!({"quantity": 0})).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        assert!(check(&validator, &json!("not an object")).is_err());
    }

    #[derive(Serialize, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    struct SampleOutput {
        order_number: String,
        total_cents: i64,
    }

    #[test]
    fn test_output_contract() {
        let validator = compile("sample", &schema_for::<SampleOutput>()).unwrap();
        let output = to_output(&SampleOutput {
            order_number: "FC-1".into(),
            total_cents: 1499,
        })
        .unwrap();
        assert!(check_output("sample", &validator, &output).is_ok());

        let err = check_output("sample", &validator, &json!({"orderNumber": 7})).unwrap_err();
        assert!(matches!(err, ToolError::Contract { tool, .. } if tool == "sample"));
    }

    #[test]
    fn test_compile_rejects_broken_schema() {
        let err = compile("broken", &json!({"type": "not-a-type"})).unwrap_err();
        assert!(matches!(err, ToolError::Contract { .. }));
    }
}
