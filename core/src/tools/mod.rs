use crate::traits::{CapabilityProvider, Tool, ToolCallResult, ToolDescriptor};
use async_trait::async_trait;
use serde_json::Value;

pub mod calculator;

pub use calculator::CalculatorTool;

pub fn extract_string_arg(args: &Value, key: &str) -> anyhow::Result<String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' parameter", key))
        .map(|s| s.to_string())
}

pub fn extract_number_arg(args: &Value, key: &str) -> anyhow::Result<f64> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow::anyhow!("Missing numeric '{}' parameter", key))
}

/// Exposes in-process [`Tool`]s through the same interface as external tool
/// hosts.
pub struct LocalProvider {
    tools: Vec<Box<dyn Tool>>,
}

impl LocalProvider {
    pub fn new() -> Self {
        Self { tools: vec![] }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Box::new(tool));
        self
    }

    /// The tools that ship with strata.
    pub fn builtin() -> Self {
        Self::new().with_tool(CalculatorTool)
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProvider for LocalProvider {
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>> {
        Ok(self.tools.iter().map(|t| t.descriptor()).collect())
    }

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<ToolCallResult> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;
        tool.execute(args).await
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
