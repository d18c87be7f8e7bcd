//! Configuration loading, validation, and management for stepwise.
//!
//! Loads configuration from `~/.stepwise/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stepwise/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider label (e.g. "ollama", "openai")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Base URL of an OpenAI-compatible endpoint; well-known providers
    /// fall back to their public URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature for every model call
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Which models play the planner and tool-caller roles
    #[serde(default)]
    pub models: ModelsConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Where run results and sessions are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_temperature() -> f32 {
    0.6
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("models", &self.models)
            .field("agent", &self.agent)
            .field("storage", &self.storage)
            .field("tools", &self.tools)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub plan_model: String,

    #[serde(default = "default_model")]
    pub tool_model: String,

    /// Plan and tool roles share one engine (and one access lock).
    #[serde(default = "default_true")]
    pub shared_engine: bool,
}

fn default_model() -> String {
    "qwen3:4b".into()
}
fn default_true() -> bool {
    true
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            plan_model: default_model(),
            tool_model: default_model(),
            shared_engine: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Rethink rounds before a run is abandoned
    #[serde(default = "default_max_rethink_rounds")]
    pub max_rethink_rounds: u32,

    /// Characters of each prior result pulled into a tool's context
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,

    /// Buffered chunks between the agent and its consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_rethink_rounds() -> u32 {
    10
}
fn default_context_char_budget() -> usize {
    1200
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rethink_rounds: default_max_rethink_rounds(),
            context_char_budget: default_context_char_budget(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "file"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory for the file backend; defaults to `~/.stepwise/data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "file".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("data"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Registered but hidden from the planner
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Request timeout for `web_fetch` and `web_search`
    #[serde(default = "default_web_fetch_timeout")]
    pub web_fetch_timeout_secs: u64,

    /// "duckduckgo" or "searxng"
    #[serde(default = "default_search_provider")]
    pub search_provider: String,

    /// Base URL of the search service; the provider's public endpoint if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_endpoint: Option<String>,
}

fn default_web_fetch_timeout() -> u64 {
    30
}
fn default_search_provider() -> String {
    "duckduckgo".into()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            web_fetch_timeout_secs: default_web_fetch_timeout(),
            search_provider: default_search_provider(),
            search_endpoint: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.stepwise/config.toml).
    ///
    /// Environment overrides:
    /// - `STEPWISE_API_KEY` (then `OPENAI_API_KEY`)
    /// - `STEPWISE_BASE_URL`
    /// - `STEPWISE_PLAN_MODEL`, `STEPWISE_TOOL_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("STEPWISE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(url) = lookup("STEPWISE_BASE_URL") {
            self.base_url = Some(url);
        }
        if let Some(model) = lookup("STEPWISE_PLAN_MODEL") {
            self.models.plan_model = model;
        }
        if let Some(model) = lookup("STEPWISE_TOOL_MODEL") {
            self.models.tool_model = model;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stepwise")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_rethink_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rethink_rounds must be at least 1".into(),
            ));
        }

        if self.agent.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "agent.channel_capacity must be at least 1".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "memory" | "file") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}' (expected \"memory\" or \"file\")",
                self.storage.backend
            )));
        }

        if !matches!(self.tools.search_provider.as_str(), "duckduckgo" | "searxng") {
            return Err(ConfigError::ValidationError(format!(
                "unknown search provider '{}' (expected \"duckduckgo\" or \"searxng\")",
                self.tools.search_provider
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            models: ModelsConfig::default(),
            agent: AgentConfig::default(),
            storage: StorageConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.agent.max_rethink_rounds, 10);
        assert_eq!(config.agent.context_char_budget, 1200);
        assert!(config.models.shared_engine);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.models.plan_model, config.models.plan_model);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_rethink_rounds_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_rethink_rounds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_storage_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "sqlite".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sqlite"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.storage.backend, "file");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "temperature = 0.2\n[agent]\nmax_rethink_rounds = 3\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert!((config.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.agent.max_rethink_rounds, 3);
        assert_eq!(config.agent.channel_capacity, 64);
        assert_eq!(config.storage.backend, "memory");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "temperature = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-test"),
            ("STEPWISE_PLAN_MODEL", "big"),
            ("STEPWISE_BASE_URL", "http://example.test/v1"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.models.plan_model, "big");
        assert_eq!(config.models.tool_model, "qwen3:4b");
        assert_eq!(config.base_url.as_deref(), Some("http://example.test/v1"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn rejects_unknown_search_provider() {
        let mut config = AppConfig::default();
        assert_eq!(config.tools.search_provider, "duckduckgo");
        config.tools.search_provider = "bing".into();
        assert!(config.validate().is_err());
        config.tools.search_provider = "searxng".into();
        config.tools.search_endpoint = Some("http://127.0.0.1:8888".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("qwen3:4b"));
        assert!(toml_str.contains("max_rethink_rounds"));
    }
}
