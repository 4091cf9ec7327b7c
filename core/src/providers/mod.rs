pub mod embedding;
pub mod factory;
pub mod openai;

pub use embedding::OpenAIEmbedder;
pub use factory::{create_chat_provider, create_embedder};
pub use openai::OpenAIProvider;
