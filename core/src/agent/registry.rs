use crate::error::{AggregateError, Error, Result};
use crate::traits::{CapabilityProvider, ToolCall, ToolCallResult, ToolDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Joins a provider name and a tool name into the name the model sees.
pub const QUALIFIED_NAME_SEPARATOR: &str = "__";

pub fn qualify(provider: &str, tool: &str) -> String {
    format!("{provider}{QUALIFIED_NAME_SEPARATOR}{tool}")
}

/// Splits on the first separator. Provider names never contain it, so the
/// split is unambiguous even when the tool name does.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once(QUALIFIED_NAME_SEPARATOR)
        .filter(|(provider, tool)| !provider.is_empty() && !tool.is_empty())
}

/// Registry of capability providers keyed by name. Lookups take a shared
/// lock; registration and removal take it exclusively. The lock is never
/// held across a provider call.
#[derive(Default)]
pub struct ToolRouter {
    providers: RwLock<BTreeMap<String, Arc<dyn CapabilityProvider>>>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, name: &str, provider: Arc<dyn CapabilityProvider>) -> Result<()> {
        if name.trim().is_empty() || name.contains(QUALIFIED_NAME_SEPARATOR) {
            return Err(Error::Validation(format!(
                "provider name '{name}' must be non-empty and \
                 must not contain '{QUALIFIED_NAME_SEPARATOR}'"
            )));
        }
        if self.contains(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        provider.init().await.map_err(|e| Error::Init {
            name: name.to_string(),
            reason: format!("{e:#}"),
        })?;

        {
            let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
            if !providers.contains_key(name) {
                providers.insert(name.to_string(), provider);
                info!(provider = name, "Capability provider registered");
                return Ok(());
            }
        }

        // Lost a registration race; undo the init we just did.
        if let Err(e) = provider.close().await {
            warn!(provider = name, error = %e, "Failed to close duplicate provider");
        }
        Err(Error::AlreadyExists(name.to_string()))
    }

    pub async fn unregister(&self, name: &str) -> Result<()> {
        let provider = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("provider '{name}'")))?;

        if let Err(e) = provider.close().await {
            warn!(provider = name, error = %e, "Failed to close provider");
        }
        info!(provider = name, "Capability provider removed");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn CapabilityProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn CapabilityProvider>)> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect()
    }

    /// Every provider's tools, renamed to their qualified names. A provider
    /// that fails to list its tools is logged and left out.
    pub async fn catalogue(&self) -> Vec<ToolDescriptor> {
        let mut all = vec![];
        for (name, provider) in self.snapshot() {
            match provider.list_tools().await {
                Ok(tools) => all.extend(tools.into_iter().map(|tool| ToolDescriptor {
                    name: qualify(&name, &tool.name),
                    ..tool
                })),
                Err(e) => warn!(provider = %name, error = %e, "Failed to list tools"),
            }
        }
        all
    }

    pub async fn execute(
        &self,
        qualified_name: &str,
        raw_arguments: &str,
    ) -> Result<ToolCallResult> {
        let (provider_name, tool_name) = split_qualified(qualified_name)
            .ok_or_else(|| Error::NotFound(format!("tool '{qualified_name}'")))?;
        let provider = self
            .get(provider_name)
            .ok_or_else(|| Error::NotFound(format!("provider '{provider_name}'")))?;

        let tools = provider
            .list_tools()
            .await
            .map_err(|e| Error::Provider(format!("provider '{provider_name}': {e:#}")))?;
        if !tools.iter().any(|tool| tool.name == tool_name) {
            return Err(Error::NotFound(format!("tool '{qualified_name}'")));
        }

        let args = parse_arguments(qualified_name, raw_arguments)?;

        debug!(provider = provider_name, tool = tool_name, "Executing tool");
        provider
            .call_tool(tool_name, args)
            .await
            .map_err(|e| Error::Provider(format!("tool '{qualified_name}' failed: {e:#}")))
    }

    /// Runs one tool call and never fails: any error becomes an `is_error`
    /// result so the model can see it and correct itself.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolCallResult {
        match self.execute(&call.name, &call.arguments).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                ToolCallResult::error(e.to_string())
            }
        }
    }

    /// Closes and removes every provider. Close failures are collected.
    pub async fn close_all(&self) -> Result<()> {
        let providers = std::mem::take(
            &mut *self.providers.write().unwrap_or_else(PoisonError::into_inner),
        );
        let mut failures = AggregateError::new();
        for (index, (name, provider)) in providers.into_iter().enumerate() {
            if let Err(e) = provider.close().await {
                failures.push(index, Error::Provider(format!("closing '{name}': {e:#}")));
            }
        }
        failures.into_result()
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let invalid = |reason: String| Error::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(invalid(format!("expected a JSON object, got {other}"))),
        Err(e) => Err(invalid(e.to_string())),
    }
}
