use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// One content block returned by a tool host.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    Text(String),
    Image { data: String, mime_type: String },
    Audio { data: String, mime_type: String },
    Unknown { kind: String, raw: Value },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Decodes a wire content block (`{"type": ..., ...}`). Tags other than
    /// text/image/audio are kept verbatim as [`ContentItem::Unknown`].
    pub fn from_value(value: Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        match value.get("type").and_then(Value::as_str) {
            Some("text") => Self::Text(field("text")),
            Some("image") => Self::Image {
                data: field("data"),
                mime_type: field("mimeType"),
            },
            Some("audio") => Self::Audio {
                data: field("data"),
                mime_type: field("mimeType"),
            },
            kind => Self::Unknown {
                kind: kind.unwrap_or("unknown").to_string(),
                raw: value.clone(),
            },
        }
    }

    /// Renders the item as text the model can read. Binary payloads become a
    /// bracketed reference instead of being inlined.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Image { data, mime_type } => {
                format!("[image: {}, {} bytes base64]", mime_or_unknown(mime_type), data.len())
            }
            Self::Audio { data, mime_type } => {
                format!("[audio: {}, {} bytes base64]", mime_or_unknown(mime_type), data.len())
            }
            Self::Unknown { kind, raw } => format!("[{kind}] {raw}"),
        }
    }
}

fn mime_or_unknown(mime_type: &str) -> &str {
    if mime_type.is_empty() {
        "unknown"
    } else {
        mime_type
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: true,
        }
    }

    pub fn rendered(&self) -> Vec<String> {
        self.content.iter().map(ContentItem::render).collect()
    }

    /// Text fed back to the model as the tool-role message.
    pub fn to_message_text(&self) -> String {
        let text = self.rendered().join("\n");
        match (self.is_error, text.trim().is_empty()) {
            (true, _) => format!("Error: {text}"),
            (false, true) => "(no output)".to_string(),
            (false, false) => text,
        }
    }
}

/// An in-process tool that can be grouped under a capability provider.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> anyhow::Result<ToolCallResult>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// An external process or service exposing a discoverable set of tools.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn init(&self) -> anyhow::Result<()>;

    async fn list_tools(&self) -> anyhow::Result<Vec<ToolDescriptor>>;

    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<ToolCallResult>;

    /// Best-effort shutdown.
    async fn close(&self) -> anyhow::Result<()>;
}
