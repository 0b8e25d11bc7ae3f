use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HubError, HubResult};
use crate::retry::RetryPolicy;

/// Categories loaded by `select_tools` when the caller gives neither
/// categories nor keywords. Covers the core scene-editing workflows.
pub const DEFAULT_CATEGORIES: [&str; 11] = [
    "GameObject",
    "Transform",
    "Material",
    "Lighting",
    "Camera",
    "Physics",
    "UI",
    "Animation",
    "Scene",
    "Audio",
    "Utility",
];

/// Runtime configuration for a hub instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Generated tool registry (name -> metadata, optional embeddings)
    pub registry_path: PathBuf,
    /// Prefix stripped from tool names to form the engine command
    pub engine_command_prefix: String,
    /// Per-attempt deadline for a forwarded command
    pub request_timeout_ms: u64,
    /// Total attempts for a forwarded command (first try included)
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay_ms: u64,
    /// `select_tools` size when `maxTools` is omitted
    pub default_selection_size: usize,
    /// Hard upper bound for `select_tools`
    pub max_selection_size: usize,
    /// `search_tools` size when `limit` is omitted
    pub search_default_limit: usize,
    /// Categories used by a parameterless `select_tools`
    pub default_categories: Vec<String>,
    /// Query embedding endpoint. Absent means text matching only.
    pub embedding: Option<EmbeddingConfig>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            registry_path: PathBuf::from("tool-registry.json"),
            engine_command_prefix: "unity_".to_string(),
            request_timeout_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            default_selection_size: 50,
            max_selection_size: 100,
            search_default_limit: 20,
            default_categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            embedding: None,
        }
    }
}

/// OpenAI-compatible embeddings endpoint used to embed search queries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_base: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl HubConfig {
    /// Create a configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> HubResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: HubConfig = toml::from_str(&content).map_err(|e| {
            HubError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HubResult<()> {
        if self.max_attempts == 0 {
            return Err(HubError::Config("max_attempts must be at least 1".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(HubError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_selection_size == 0 {
            return Err(HubError::Config(
                "max_selection_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            per_attempt_timeout: self.request_timeout(),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
