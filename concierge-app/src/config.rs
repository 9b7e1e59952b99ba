use concierge_runtime::{PipelineConfig, DEFAULT_SYSTEM_PROMPT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/concierge.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any OpenAI-compatible chat-completions endpoint.
    OpenAI,
    /// Canned replies; no network. For demos and offline runs.
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAI,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub step_budget: usize,
    pub wall_clock_secs: u64,
    pub tool_timeout_ms: u64,
    pub ledger_capacity: usize,
    pub lock_timeout_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            step_budget: defaults.step_budget,
            wall_clock_secs: defaults.wall_clock.as_secs(),
            tool_timeout_ms: defaults.tool_timeout_ms,
            ledger_capacity: defaults.ledger_capacity,
            lock_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Per-tool `requiresApproval` overrides.
    pub approval: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sqlite,
            path: PathBuf::from("data/concierge.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// YAML list of catalog items loaded at startup.
    pub seed: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub pipeline: PipelineSection,
    pub tools: ToolsConfig,
    pub store: StoreConfig,
    pub catalog: CatalogConfig,
    pub server: ServerConfig,
    pub system_prompt: Option<String>,
    pub system_prompt_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Deployment overrides: `CONCIERGE_MODEL`, `CONCIERGE_BASE_URL`,
    /// `CONCIERGE_BIND`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("CONCIERGE_MODEL") {
            self.model.model = model;
        }
        if let Some(base_url) = lookup("CONCIERGE_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(bind) = lookup("CONCIERGE_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.step_budget == 0 {
            return Err(ConfigError::Invalid("pipeline.step_budget must be at least 1".into()));
        }
        if self.pipeline.wall_clock_secs == 0 {
            return Err(ConfigError::Invalid("pipeline.wall_clock_secs must be at least 1".into()));
        }
        if self.pipeline.tool_timeout_ms == 0 {
            return Err(ConfigError::Invalid("pipeline.tool_timeout_ms must be positive".into()));
        }
        if self.pipeline.tool_timeout_ms >= self.pipeline.wall_clock_secs.saturating_mul(1000) {
            return Err(ConfigError::Invalid(
                "pipeline.tool_timeout_ms must be below pipeline.wall_clock_secs".into(),
            ));
        }
        if self.model.provider == ProviderKind::OpenAI {
            if self.model.model.trim().is_empty() {
                return Err(ConfigError::Invalid("model.model is required".into()));
            }
            if self.model.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid("model.base_url is required".into()));
            }
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind is required".into()));
        }
        Ok(())
    }

    pub fn system_prompt(&self) -> Result<String, ConfigError> {
        if let Some(path) = &self.system_prompt_file {
            return std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            });
        }
        Ok(self
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()))
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        Ok(PipelineConfig {
            step_budget: self.pipeline.step_budget,
            wall_clock: Duration::from_secs(self.pipeline.wall_clock_secs),
            tool_timeout_ms: self.pipeline.tool_timeout_ms,
            ledger_capacity: self.pipeline.ledger_capacity,
            system_prompt: self.system_prompt()?,
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.pipeline.lock_timeout_ms)
    }
}

/// `--config <path>` wins, then `CONCIERGE_CONFIG`, then the default path.
pub fn config_path(args: &[String], env_path: Option<String>) -> PathBuf {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or(env_path)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AppConfig::from_yaml("").unwrap();
        assert_eq!(config.pipeline.step_budget, 5);
        assert_eq!(config.pipeline.wall_clock_secs, 30);
        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config = AppConfig::from_yaml(
            r#"
model:
  provider: scripted
pipeline:
  step_budget: 3
tools:
  approval:
    log_feedback: true
    purchase: false
"#,
        )
        .unwrap();
        assert_eq!(config.model.provider, ProviderKind::Scripted);
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.pipeline.step_budget, 3);
        assert_eq!(config.pipeline.tool_timeout_ms, 10_000);
        assert_eq!(config.tools.approval.get("purchase"), Some(&false));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            "CONCIERGE_MODEL" => Some("llama3".to_string()),
            "CONCIERGE_BIND" => Some("0.0.0.0:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.model.model, "llama3");
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.pipeline.step_budget = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = AppConfig::default();
        config.model.model = " ".into();
        assert!(config.validate().is_err());
        config.model.provider = ProviderKind::Scripted;
        assert!(config.validate().is_ok());

        // A single tool call may not outlive the request ceiling.
        let mut config = AppConfig::default();
        config.pipeline.wall_clock_secs = 5;
        config.pipeline.tool_timeout_ms = 5_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.pipeline.tool_timeout_ms = 4_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        assert!(matches!(
            AppConfig::from_yaml("model:\n  provider: carrier-pigeon\n"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_config_path_precedence() {
        let args = vec!["concierge".to_string(), "--config".to_string(), "a.yaml".to_string()];
        assert_eq!(config_path(&args, Some("b.yaml".into())), PathBuf::from("a.yaml"));
        assert_eq!(config_path(&args[..1], Some("b.yaml".into())), PathBuf::from("b.yaml"));
        assert_eq!(config_path(&args[..1], None), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_pipeline_config_reads_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("prompt.md");
        std::fs::write(&prompt, "Be brief.").unwrap();

        let mut config = AppConfig::default();
        config.system_prompt_file = Some(prompt);
        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.system_prompt, "Be brief.");
        assert_eq!(pipeline.wall_clock, Duration::from_secs(30));
    }
}
