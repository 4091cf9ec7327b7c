//! Stdio client for MCP tool-host servers.
//!
//! Messages are newline-delimited JSON-RPC 2.0. Requests on one connection
//! are serialized: each request holds the connection until its response
//! arrives.

use crate::mcp::config::McpServerConfig;
use crate::traits::{CapabilityProvider, ContentItem, ToolCallResult, ToolDescriptor};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    id: Option<Value>,
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<WireTool>,
}

#[derive(Debug, Deserialize)]
struct WireTool {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    input_schema: Option<Value>,
}

struct Connection {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl Connection {
    async fn send(&mut self, message: &RpcRequest<'_>) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.send(&RpcRequest {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        })
        .await?;

        tokio::time::timeout(REQUEST_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| anyhow!("'{method}' timed out after {}s", REQUEST_TIMEOUT.as_secs()))?
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        self.send(&RpcRequest {
            jsonrpc: "2.0",
            id: None,
            method,
            params: None,
        })
        .await
    }

    /// Reads lines until the response for `id`. Server notifications, stale
    /// responses and non-JSON output are skipped.
    async fn read_response(&mut self, id: u64) -> Result<Value> {
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(match self.child.try_wait() {
                    Ok(Some(status)) => anyhow!("server exited with {status}"),
                    _ => anyhow!("server closed stdout unexpectedly"),
                });
            }

            let line = line.trim();
            if !line.starts_with('{') {
                if !line.is_empty() {
                    debug!(line, "Skipping non-JSON line");
                }
                continue;
            }

            let response: RpcResponse = match serde_json::from_str(line) {
                Ok(response) => response,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable message");
                    continue;
                }
            };
            if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = response.error {
                return Err(anyhow!("server error {}: {}", error.code, error.message));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

/// A [`CapabilityProvider`] backed by a child process speaking MCP over
/// stdio. The process is spawned by `init` and killed by `close`.
pub struct McpClient {
    config: McpServerConfig,
    connection: Mutex<Option<Connection>>,
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            tools: RwLock::new(vec![]),
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn spawn(&self) -> Result<Connection> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                anyhow!("command not found: {}", self.config.command)
            } else {
                anyhow!("failed to spawn {}: {}", self.config.command, e)
            }
        })?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout"))?;
        Ok(Connection {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 1,
        })
    }

    async fn handshake(&self, conn: &mut Connection) -> Result<Vec<ToolDescriptor>> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "strata", "version": env!("CARGO_PKG_VERSION")},
        });
        let result = conn.request("initialize", Some(params)).await?;
        debug!(
            server = %self.config.name,
            protocol = negotiated_protocol(&result),
            "MCP server initialized"
        );
        conn.notify("notifications/initialized").await?;

        let listed: ToolsListResult =
            serde_json::from_value(conn.request("tools/list", None).await?)?;
        Ok(listed
            .tools
            .into_iter()
            .map(|t| ToolDescriptor {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema.unwrap_or_else(|| json!({"type": "object"})),
            })
            .collect())
    }
}

#[async_trait]
impl CapabilityProvider for McpClient {
    async fn init(&self) -> Result<()> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() {
            return Err(anyhow!("'{}' is already initialized", self.config.name));
        }

        info!(server = %self.config.name, command = %self.config.command, "Starting MCP server");
        let mut conn = self.spawn()?;
        let tools = match self.handshake(&mut conn).await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = conn.child.kill().await;
                return Err(e);
            }
        };

        info!(
            server = %self.config.name,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "MCP server ready"
        );
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
        *slot = Some(conn);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn call_tool(&self, name: &str, args: Value) -> Result<ToolCallResult> {
        let mut slot = self.connection.lock().await;
        let conn = slot
            .as_mut()
            .ok_or_else(|| anyhow!("'{}' is not connected", self.config.name))?;

        let result = conn
            .request("tools/call", Some(json!({"name": name, "arguments": args})))
            .await?;
        Ok(decode_tool_result(result))
    }

    async fn close(&self) -> Result<()> {
        let Some(mut conn) = self.connection.lock().await.take() else {
            return Ok(());
        };
        self.tools.write().unwrap_or_else(PoisonError::into_inner).clear();

        drop(conn.stdin);
        if let Ok(Some(status)) = conn.child.try_wait() {
            info!(server = %self.config.name, %status, "MCP server already exited");
            return Ok(());
        }
        if let Err(e) = conn.child.kill().await {
            warn!(server = %self.config.name, error = %e, "Failed to stop MCP server");
            return Err(e.into());
        }
        info!(server = %self.config.name, "MCP server stopped");
        Ok(())
    }
}

fn negotiated_protocol(result: &Value) -> &str {
    result
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or("?")
}

fn decode_tool_result(result: Value) -> ToolCallResult {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = match result.get("content") {
        Some(Value::Array(items)) => items.iter().cloned().map(ContentItem::from_value).collect(),
        _ => vec![],
    };
    ToolCallResult { content, is_error }
}
