pub mod embedding;
pub mod provider;
pub mod tool;

pub use embedding::Embedder;
pub use provider::{
    ChatDelta, ChatMessage, ChatProvider, ChatRequest, ProviderEvent, ProviderStream, Role,
    ToolCall, ToolCallDelta,
};
pub use tool::{CapabilityProvider, ContentItem, Tool, ToolCallResult, ToolDescriptor};
