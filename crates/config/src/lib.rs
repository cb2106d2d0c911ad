//! Configuration loading, validation, and management for MindThread.
//!
//! Loads configuration from `~/.mindthread/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use mindthread_core::agent::AgentConfig;
use mindthread_core::memory::{ClusterAlgorithm, ClusteringConfig, MemoryEngineConfig};
use mindthread_core::provider::ThinkingOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mindthread/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Embedding model; unset disables embeddings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent persona and request limits
    #[serde(default)]
    pub agent: AgentSection,

    /// Memory engine configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Memory clustering configuration
    #[serde(default)]
    pub clustering: ClusteringSection,

    /// Speech command configuration
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
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
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("embedding_model", &self.embedding_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("memory", &self.memory)
            .field("clustering", &self.clustering)
            .field("speech", &self.speech)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_persona")]
    pub persona: String,

    #[serde(default)]
    pub instructions: Vec<String>,

    #[serde(default = "default_max_history")]
    pub max_conversation_history: usize,

    /// Whole-request deadline in milliseconds
    #[serde(default = "default_max_processing_time_ms")]
    pub max_processing_time_ms: u64,

    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default)]
    pub enable_thinking: bool,

    #[serde(default = "default_thinking_budget")]
    pub thinking_budget_tokens: u32,
}

fn default_agent_name() -> String {
    "MindThread".into()
}
fn default_persona() -> String {
    "You are a helpful assistant with a long-term memory of past conversations.".into()
}
fn default_max_history() -> usize {
    50
}
fn default_max_processing_time_ms() -> u64 {
    60_000
}
fn default_user_id() -> String {
    "default_user".into()
}
fn default_max_sessions() -> usize {
    256
}
fn default_thinking_budget() -> u32 {
    2048
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            persona: default_persona(),
            instructions: Vec::new(),
            max_conversation_history: default_max_history(),
            max_processing_time_ms: default_max_processing_time_ms(),
            default_user_id: default_user_id(),
            max_sessions: default_max_sessions(),
            enable_thinking: false,
            thinking_budget_tokens: default_thinking_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// When false the runtime runs without a memory engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Contextual memories pulled per request
    #[serde(default = "default_contextual_window")]
    pub contextual_window: usize,

    /// Results requested per memory query
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
}

fn default_contextual_window() -> usize {
    5
}
fn default_query_limit() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_path: None,
            contextual_window: default_contextual_window(),
            query_limit: default_query_limit(),
        }
    }
}

/// What happens to clustering after a failed refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicyKind {
    /// Disable clustering for the rest of the process lifetime
    #[default]
    Disable,
    /// Keep clustering enabled and retry after `retry_after_secs`
    Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicyKind,

    /// Only used with `failure_policy = "backoff"`
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

fn default_refresh_interval() -> u64 {
    300
}
fn default_similarity_threshold() -> f32 {
    0.7
}
fn default_max_clusters() -> usize {
    10
}
fn default_min_cluster_size() -> usize {
    2
}
fn default_retry_after() -> u64 {
    600
}

impl Default for ClusteringSection {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: default_refresh_interval(),
            similarity_threshold: default_similarity_threshold(),
            max_clusters: default_max_clusters(),
            min_cluster_size: default_min_cluster_size(),
            failure_policy: FailurePolicyKind::default(),
            retry_after_secs: default_retry_after(),
        }
    }
}

/// External commands used for speech. `{input}` and `{output}` are
/// substituted with file paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcribe_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesize_command: Option<String>,

    /// Where synthesized audio is written (default: system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

impl SpeechConfig {
    pub fn is_configured(&self) -> bool {
        self.transcribe_command.is_some() || self.synthesize_command.is_some()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load `config.toml` from [`config_dir`](Self::config_dir), then apply
    /// environment overrides.
    ///
    /// The first of `MINDTHREAD_API_KEY`, `OPENROUTER_API_KEY` and
    /// `OPENAI_API_KEY` fills a missing key. `MINDTHREAD_PROVIDER`,
    /// `MINDTHREAD_MODEL` and `MINDTHREAD_EMBEDDING_MODEL` replace their
    /// settings outright.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_dir().join("config.toml"))?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = ["MINDTHREAD_API_KEY", "OPENROUTER_API_KEY", "OPENAI_API_KEY"]
                .into_iter()
                .find_map(|key| var(key).filter(|v| !v.is_empty()));
        }
        if let Some(provider) = var("MINDTHREAD_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = var("MINDTHREAD_MODEL") {
            self.default_model = model;
        }
        if let Some(model) = var("MINDTHREAD_EMBEDDING_MODEL") {
            self.embedding_model = Some(model).filter(|m| !m.is_empty());
        }
    }

    /// Parse and validate a config file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let read_err = |reason: String| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// `$MINDTHREAD_HOME` if set, otherwise `~/.mindthread`.
    pub fn config_dir() -> PathBuf {
        match std::env::var_os("MINDTHREAD_HOME") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs_home().join(".mindthread"),
        }
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn ensure(ok: bool, message: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::ValidationError(message.into()))
            }
        }

        ensure(
            (0.0..=2.0).contains(&self.default_temperature),
            "default_temperature must be between 0.0 and 2.0",
        )?;
        ensure(
            self.agent.max_conversation_history > 0,
            "agent.max_conversation_history must be at least 1",
        )?;
        ensure(
            self.agent.max_processing_time_ms > 0,
            "agent.max_processing_time_ms must be > 0",
        )?;
        ensure(self.agent.max_sessions > 0, "agent.max_sessions must be at least 1")?;
        ensure(
            (0.0..=1.0).contains(&self.clustering.similarity_threshold),
            "clustering.similarity_threshold must be between 0.0 and 1.0",
        )?;
        ensure(
            self.clustering.min_cluster_size > 0 && self.clustering.max_clusters > 0,
            "clustering.min_cluster_size and clustering.max_clusters must be > 0",
        )
    }

    /// Whether a key was found in the file or the environment.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The default configuration rendered as TOML, for `config init`-style output.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    /// The agent settings the runtime consumes.
    pub fn to_agent_config(&self) -> AgentConfig {
        let thinking = self.agent.enable_thinking.then(|| ThinkingOptions {
            enabled: true,
            budget_tokens: self.agent.thinking_budget_tokens,
        });

        AgentConfig {
            name: self.agent.name.clone(),
            persona: self.agent.persona.clone(),
            instructions: self.agent.instructions.clone(),
            model: self.default_model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.default_temperature,
            max_tokens: Some(self.default_max_tokens),
            thinking,
            max_conversation_history: self.agent.max_conversation_history,
            max_processing_time_ms: self.agent.max_processing_time_ms,
            default_user_id: self.agent.default_user_id.clone(),
            max_sessions: self.agent.max_sessions,
            memory_query_limit: self.memory.query_limit,
            contextual_window: self.memory.contextual_window,
        }
    }

    /// Settings passed to the memory engine's `initialize`.
    pub fn memory_engine_config(&self) -> MemoryEngineConfig {
        MemoryEngineConfig {
            storage_path: self.memory.storage_path.clone(),
            namespace: self.agent.name.to_lowercase(),
        }
    }

    /// Parameters for each clustering run.
    pub fn clustering_config(&self) -> ClusteringConfig {
        ClusteringConfig {
            similarity_threshold: self.clustering.similarity_threshold,
            max_clusters: self.clustering.max_clusters,
            min_cluster_size: self.clustering.min_cluster_size,
            algorithm: ClusterAlgorithm::KMeans,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            embedding_model: None,
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentSection::default(),
            memory: MemoryConfig::default(),
            clustering: ClusteringSection::default(),
            speech: SpeechConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn dirs_home() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
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

impl From<ConfigError> for mindthread_core::Error {
    fn from(err: ConfigError) -> Self {
        mindthread_core::Error::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.agent.max_conversation_history, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.clustering.refresh_interval_secs, 300);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_history_cap_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_conversation_history = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_conversation_history"));
    }

    #[test]
    fn out_of_range_similarity_rejected() {
        let mut config = AppConfig::default();
        config.clustering.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openrouter");
    }

    #[test]
    fn load_from_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o"
embedding_model = "text-embedding-3-small"

[agent]
name = "Ada"
max_conversation_history = 4
enable_thinking = true

[clustering]
failure_policy = "backoff"
retry_after_secs = 30

[speech]
transcribe_command = "whisper {{input}}"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.name, "Ada");
        assert_eq!(config.clustering.failure_policy, FailurePolicyKind::Backoff);
        assert_eq!(config.clustering.retry_after_secs, 30);
        assert!(config.speech.is_configured());

        let agent = config.to_agent_config();
        assert_eq!(agent.model, "gpt-4o");
        assert_eq!(agent.max_conversation_history, 4);
        assert_eq!(agent.embedding_model.as_deref(), Some("text-embedding-3-small"));
        assert_eq!(agent.thinking.unwrap().budget_tokens, 2048);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = \"hot\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_fills_missing_key_and_overrides_models() {
        let env: HashMap<&str, &str> = [
            ("OPENROUTER_API_KEY", "sk-or"),
            ("OPENAI_API_KEY", "sk-oa"),
            ("MINDTHREAD_MODEL", "gpt-4o-mini"),
            ("MINDTHREAD_EMBEDDING_MODEL", "text-embedding-3-small"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| env.get(key).map(|v| v.to_string());

        let mut config = AppConfig::default();
        config.apply_env(lookup);
        assert_eq!(config.api_key.as_deref(), Some("sk-or"));
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.embedding_model.as_deref(), Some("text-embedding-3-small"));
        assert_eq!(config.default_provider, "openrouter");

        let mut configured = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        configured.apply_env(lookup);
        assert_eq!(configured.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn clustering_config_mirrors_section() {
        let config = AppConfig::default();
        let clustering = config.clustering_config();
        assert_eq!(clustering.max_clusters, 10);
        assert_eq!(clustering.min_cluster_size, 2);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let dbg = format!("{config:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("sk-secret"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("refresh_interval_secs"));
    }
}
