use crate::config::Config;
use crate::providers::{OpenAIEmbedder, OpenAIProvider};
use crate::traits::{ChatProvider, Embedder};
use anyhow::{Result, anyhow};
use std::sync::Arc;

pub fn create_chat_provider(config: &Config) -> Result<Arc<dyn ChatProvider>> {
    let api_key = resolve_api_key_with_fallback(
        &["OPENAI_API_KEY", "STRATA_OPENAI_API_KEY"],
        &config.chat.api_key,
    )
    .map_err(|e| anyhow!("{e} for chat (set OPENAI_API_KEY or [chat].api_key)"))?;

    let provider = OpenAIProvider::new(api_key)
        .with_model(config.chat.model.clone())
        .with_base_url(config.chat.base_url.clone())
        .with_temperature(config.chat.temperature);
    Ok(Arc::new(provider))
}

/// The embedding key falls back to the chat key when neither the embedding
/// environment variables nor `[embedding].api_key` are set.
pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let api_key = resolve_api_key_with_fallback(
        &["EMBEDDING_API_KEY", "STRATA_EMBEDDING_API_KEY"],
        &config.embedding.api_key,
    )
    .or_else(|_| {
        resolve_api_key_with_fallback(
            &["OPENAI_API_KEY", "STRATA_OPENAI_API_KEY"],
            &config.chat.api_key,
        )
    })
    .map_err(|e| anyhow!("{e} for embeddings (set EMBEDDING_API_KEY or [embedding].api_key)"))?;

    let embedder = OpenAIEmbedder::new(api_key)
        .with_model(config.embedding.model.clone())
        .with_base_url(config.embedding.base_url.clone());
    Ok(Arc::new(embedder))
}

fn resolve_api_key_with_fallback(env_vars: &[&str], config_key: &str) -> Result<String> {
    for var_name in env_vars {
        if let Ok(key) = resolve_api_key_from_env(var_name) {
            return Ok(key);
        }
    }
    if !config_key.is_empty() {
        Ok(config_key.to_string())
    } else {
        Err(anyhow!("No API key found"))
    }
}

fn resolve_api_key_from_env(var_name: &str) -> Result<String> {
    std::env::var(var_name)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| anyhow!("Environment variable {} not set", var_name))
}
