use crate::agent::{DEFAULT_SYSTEM_PROMPT, OrchestratorConfig, RetryPolicy};
use crate::error::Error;
use crate::retriever::DEFAULT_INGEST_CONCURRENCY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const STRATA_DIR: &str = ".strata";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub system_prompt: String,
    pub context: String,
    pub max_retries: usize,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
    pub retrieval_limit: usize,
    pub max_tool_rounds: usize,
    pub ingest_concurrency: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "strata".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            context: String::new(),
            max_retries: 3,
            backoff_secs: 1,
            timeout_secs: 30,
            retrieval_limit: 5,
            max_tool_rounds: 20,
            ingest_concurrency: DEFAULT_INGEST_CONCURRENCY,
        }
    }
}

impl AgentConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            name: self.name.clone(),
            system_prompt: self.system_prompt.clone(),
            context: self.context.clone(),
            retry: RetryPolicy::new(self.max_retries, Duration::from_secs(self.backoff_secs)),
            timeout: Duration::from_secs(self.timeout_secs),
            retrieval_limit: self.retrieval_limit,
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Relative paths resolve against the strata directory.
    pub knowledge_dir: PathBuf,
    pub mcp_servers: PathBuf,
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            knowledge_dir: PathBuf::from("knowledge"),
            mcp_servers: PathBuf::from("mcp_servers.json"),
            chat: ChatConfig::default(),
            embedding: EmbeddingConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

pub fn get_strata_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(STRATA_DIR)
}

pub fn get_config_path() -> PathBuf {
    get_strata_dir().join("config.toml")
}

pub fn ensure_strata_dir() -> Result<PathBuf> {
    let strata_dir = get_strata_dir();

    if !strata_dir.exists() {
        std::fs::create_dir_all(&strata_dir).with_context(|| {
            format!(
                "Failed to create strata directory at {}",
                strata_dir.display()
            )
        })?;
    }

    Ok(strata_dir)
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        if config_exists() {
            load_config()
        } else {
            Ok(Config::default())
        }
    }

    pub fn knowledge_path(&self) -> PathBuf {
        resolve(&self.knowledge_dir)
    }

    pub fn mcp_servers_path(&self) -> PathBuf {
        resolve(&self.mcp_servers)
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: &str| Err(Error::Validation(msg.to_string()));

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::Validation(format!(
                "unknown log level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        if self.agent.max_retries == 0 {
            return invalid("agent.max_retries must be at least 1");
        }
        if self.agent.timeout_secs == 0 {
            return invalid("agent.timeout_secs must be at least 1");
        }
        if self.agent.ingest_concurrency == 0 {
            return invalid("agent.ingest_concurrency must be at least 1");
        }
        if self.agent.retrieval_limit == 0 {
            return invalid("agent.retrieval_limit must be at least 1");
        }
        if self.chat.model.trim().is_empty() || self.embedding.model.trim().is_empty() {
            return invalid("chat.model and embedding.model must be set");
        }
        Ok(())
    }
}

fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        get_strata_dir().join(path)
    }
}

pub fn load_config() -> Result<Config> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(config_path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(config_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("Config file not found. Run 'strata init' to create one.")
        } else {
            anyhow::anyhow!("Failed to read config from {}: {}", config_path.display(), e)
        }
    })?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    ensure_strata_dir()?;
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &Config, config_path: &Path) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config to TOML")?;

    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config to {}", config_path.display()))?;

    Ok(())
}

pub fn config_exists() -> bool {
    get_config_path().exists()
}
