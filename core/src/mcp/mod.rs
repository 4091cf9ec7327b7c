pub mod client;
pub mod config;

pub use client::McpClient;
pub use config::{McpServerConfig, load_server_configs};
