pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod retriever;
pub mod tools;
pub mod traits;
pub mod vectorstore;

#[cfg(test)]
mod test_support;

pub use agent::{Augmentation, Orchestrator, OrchestratorConfig, QueryResponse, ToolRouter};
pub use config::*;
pub use error::{AggregateError, Error, Result};
pub use mcp::{McpClient, McpServerConfig};
pub use providers::{OpenAIEmbedder, OpenAIProvider, create_chat_provider, create_embedder};
pub use retriever::Retriever;
pub use tools::LocalProvider;
pub use traits::*;
pub use vectorstore::VectorStore;
