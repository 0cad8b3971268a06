//! Configuration loading, validation, and management for the CPM agent.
//!
//! Loads configuration from `~/.cpmagent/config.toml` (or the file named by
//! `CPMAGENT_CONFIG`) with environment variable overrides. Validates all
//! settings at startup, so the agent never sees a reflection frequency of
//! zero or an out-of-range temperature.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cpmagent/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model backend and sampling settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Optional tool toggles
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Prompt template overrides
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend: "local", "llamacpp", "vllm", "ollama", "openai", "openrouter", or "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name sent to the backend; for "local" this is the hub repository
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Local model file or directory; skips the hub download when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Base URL of an HTTP backend (defaults per provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens per generation (also the context length for local models)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,

    /// Where downloaded model files are cached
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Quantization versions to download, e.g. `["Q4_K_M"]`
    #[serde(default = "default_gguf_versions")]
    pub gguf_versions: Vec<String>,

    /// Repository holding `tokenizer.json` for local inference
    #[serde(default = "default_tokenizer_repo")]
    pub tokenizer_repo: String,

    /// "auto", "cpu", "cuda" or "metal"
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_provider() -> String {
    "llamacpp".into()
}
fn default_model_name() -> String {
    "DevQuasar/openbmb.MiniCPM4-0.5B-GGUF".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_repeat_penalty() -> f32 {
    1.0
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("./models")
}
fn default_gguf_versions() -> Vec<String> {
    vec!["Q4_K_M".into()]
}
fn default_tokenizer_repo() -> String {
    "openbmb/MiniCPM4-0.5B".into()
}
fn default_device() -> String {
    "auto".into()
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

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("path", &self.path)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("repeat_penalty", &self.repeat_penalty)
            .field("cache_dir", &self.cache_dir)
            .field("gguf_versions", &self.gguf_versions)
            .field("tokenizer_repo", &self.tokenizer_repo)
            .field("device", &self.device)
            .finish()
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            name: default_model_name(),
            path: None,
            api_url: None,
            api_key: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            repeat_penalty: default_repeat_penalty(),
            cache_dir: default_cache_dir(),
            gguf_versions: default_gguf_versions(),
            tokenizer_repo: default_tokenizer_repo(),
            device: default_device(),
        }
    }
}

/// Which agent answers `/chat` and the CLI's default command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentMode {
    /// Plan, execute step by step, reflect periodically, then answer
    #[default]
    PlanExecute,
    /// Single conversation where the model calls tools
    ToolCalling,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::PlanExecute => "plan_execute",
            AgentMode::ToolCalling => "tool_calling",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub mode: AgentMode,

    /// Plans longer than this are truncated
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,

    /// Model calls allowed per tool-calling chat
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    #[serde(default)]
    pub reflection: ReflectionConfig,
}

fn default_max_plan_steps() -> usize {
    20
}
fn default_max_tool_iterations() -> usize {
    5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: AgentMode::default(),
            max_plan_steps: default_max_plan_steps(),
            max_tool_iterations: default_max_tool_iterations(),
            reflection: ReflectionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reflect before every step whose index is a multiple of this.
    /// Signed so that negative values parse and are rejected by validation.
    #[serde(default = "default_reflection_frequency")]
    pub frequency: i64,

    /// Whether reflection entries are shown to later execution prompts
    #[serde(default = "default_true")]
    pub feed_into_execution: bool,
}

fn default_reflection_frequency() -> i64 {
    5
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frequency: default_reflection_frequency(),
            feed_into_execution: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub search: bool,

    #[serde(default)]
    pub file_read: bool,

    #[serde(default)]
    pub code_exec: bool,

    /// Roots `file_read` may access. Empty means the working directory.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    #[serde(default = "default_code_exec_timeout")]
    pub code_exec_timeout_secs: u64,
}

fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.aws".into(),
    ]
}
fn default_code_exec_timeout() -> u64 {
    10
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search: false,
            file_read: false,
            code_exec: false,
            allowed_roots: vec![],
            forbidden_paths: default_forbidden_paths(),
            code_exec_timeout_secs: default_code_exec_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on one `/chat` request, including every generation call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_request_timeout() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Directory of `*.toml` template files overriding the built-ins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from `CPMAGENT_CONFIG` or the default path
    /// (`~/.cpmagent/config.toml`), then apply environment overrides.
    ///
    /// Environment variables:
    /// - `CPMAGENT_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `CPMAGENT_PROVIDER`
    /// - `MODEL_NAME`, `MODEL_PATH`, `MODEL_MAX_LENGTH`, `MODEL_TEMPERATURE`
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CPMAGENT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        Self::load_with_env(&path)
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
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

        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::ParseError { reason, .. } => ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.model.api_key.is_none() {
            self.model.api_key = lookup("CPMAGENT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("CPMAGENT_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(name) = lookup("MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("MODEL_MAX_LENGTH") {
            self.model.max_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("MODEL_MAX_LENGTH must be a positive integer, got '{raw}'"))
            })?;
        }
        if let Some(raw) = lookup("MODEL_TEMPERATURE") {
            self.model.temperature = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("MODEL_TEMPERATURE must be a number, got '{raw}'"))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cpmagent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let model = &self.model;
        if !(0.0..=2.0).contains(&model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if !(model.top_p > 0.0 && model.top_p <= 1.0) {
            return Err(ConfigError::ValidationError(
                "model.top_p must be in (0.0, 1.0]".into(),
            ));
        }
        if model.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_tokens must be > 0".into(),
            ));
        }
        if self.agent.reflection.frequency <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "agent.reflection.frequency must be > 0, got {}",
                self.agent.reflection.frequency
            )));
        }
        if self.agent.max_plan_steps == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_plan_steps must be > 0".into(),
            ));
        }
        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be > 0".into(),
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.request_timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        Self::default().to_toml().unwrap_or_default()
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

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.provider, "llamacpp");
        assert_eq!(config.gateway.port, 8000);
        assert_eq!(config.agent.mode, AgentMode::PlanExecute);
        assert!(config.agent.reflection.enabled);
        assert_eq!(config.agent.reflection.frequency, 5);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.model.name, config.model.name);
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.model.gguf_versions, vec!["Q4_K_M".to_string()]);
    }

    #[test]
    fn zero_frequency_rejected() {
        let err = AppConfig::from_toml("[agent.reflection]\nfrequency = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("frequency")));
    }

    #[test]
    fn negative_frequency_rejected() {
        let err = AppConfig::from_toml("[agent.reflection]\nfrequency = -3\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn disabled_reflection_still_needs_valid_frequency() {
        let toml = "[agent.reflection]\nenabled = false\nfrequency = 0\n";
        assert!(AppConfig::from_toml(toml).is_err());
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let toml = r#"
[model]
provider = "vllm"
api_url = "http://gpu-box:8000/v1"

[agent]
mode = "tool_calling"

[tools]
search = true
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.model.provider, "vllm");
        assert_eq!(config.model.api_url.as_deref(), Some("http://gpu-box:8000/v1"));
        assert_eq!(config.agent.mode, AgentMode::ToolCalling);
        assert_eq!(config.agent.max_plan_steps, 20);
        assert!(config.tools.search);
        assert!(!config.tools.code_exec);
    }

    #[test]
    fn unknown_mode_is_a_parse_error() {
        let err = AppConfig::from_toml("[agent]\nmode = \"freestyle\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model.provider, "llamacpp");
    }

    #[test]
    fn file_errors_carry_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[model\nbroken").unwrap();
        match AppConfig::load_from(&path).unwrap_err() {
            ConfigError::ParseError { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("MODEL_NAME", "openbmb/MiniCPM4-8B"),
                ("MODEL_PATH", "/models/minicpm.gguf"),
                ("MODEL_MAX_LENGTH", "4096"),
                ("MODEL_TEMPERATURE", "0.2"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();
        assert_eq!(config.model.name, "openbmb/MiniCPM4-8B");
        assert_eq!(config.model.path, Some(PathBuf::from("/models/minicpm.gguf")));
        assert_eq!(config.model.max_tokens, 4096);
        assert!((config.model.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn configured_api_key_wins_over_env() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("from-file".into());
        config.apply_env(env(&[("CPMAGENT_API_KEY", "from-env")])).unwrap();
        assert_eq!(config.model.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn bad_env_numbers_rejected() {
        let mut config = AppConfig::default();
        assert!(config.apply_env(env(&[("MODEL_MAX_LENGTH", "lots")])).is_err());
        let mut config = AppConfig::default();
        assert!(config.apply_env(env(&[("MODEL_TEMPERATURE", "9.5")])).is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("llamacpp"));
        assert!(toml_str.contains("frequency = 5"));
    }
}
