use crate::tools::{extract_number_arg, extract_string_arg};
use crate::traits::{Tool, ToolCallResult};
use async_trait::async_trait;
use serde_json::json;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Basic arithmetic: op is one of add, sub, mul, div"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["add", "sub", "mul", "div"],
                    "description": "Operation to apply"
                },
                "a": {
                    "type": "number",
                    "description": "First operand"
                },
                "b": {
                    "type": "number",
                    "description": "Second operand"
                }
            },
            "required": ["op", "a", "b"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolCallResult> {
        let op = extract_string_arg(&args, "op")?;
        let a = extract_number_arg(&args, "a")?;
        let b = extract_number_arg(&args, "b")?;

        let value = match op.as_str() {
            "add" => a + b,
            "sub" => a - b,
            "mul" => a * b,
            "div" if b == 0.0 => return Ok(ToolCallResult::error("division by zero")),
            "div" => a / b,
            other => return Ok(ToolCallResult::error(format!("unsupported operation: {other}"))),
        };

        Ok(ToolCallResult::success(value.to_string()))
    }
}
