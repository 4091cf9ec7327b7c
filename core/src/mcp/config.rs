use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// One stdio tool-host server entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Reads the server list. A missing file means no servers; entries without a
/// name or command are skipped.
pub fn load_server_configs(path: &Path) -> Result<Vec<McpServerConfig>> {
    if !path.exists() {
        debug!(path = %path.display(), "No MCP server list found");
        return Ok(vec![]);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read MCP server list from {}", path.display()))?;
    let configs: Vec<McpServerConfig> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse MCP server list from {}", path.display()))?;

    Ok(configs
        .into_iter()
        .filter(|c| {
            let usable = !c.name.trim().is_empty() && !c.command.trim().is_empty();
            if !usable {
                warn!(name = %c.name, "Skipping MCP server entry without name or command");
            }
            usable
        })
        .collect())
}
