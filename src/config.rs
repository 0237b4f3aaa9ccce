use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};
use crate::provider::Provider;

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_INDEX_DIR: &str = "Output";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Settings persisted at `<config_dir>/ragbot/config.json`.
///
/// Every field is optional on disk; accessors fill in defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub temperature: Option<f32>,
    pub claude_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub index_dir: Option<PathBuf>,
    pub default_k: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub max_concurrent_queries: Option<usize>,
    pub template_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            provider: Some(Provider::OpenAI.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("ragbot").join("config.json"))
    }

    /// Reject values that cannot work instead of silently replacing them.
    pub fn validate(&self) -> Result<()> {
        if let Some(p) = &self.provider {
            p.parse::<Provider>().map_err(ChatError::Config)?;
        }
        if self.default_k == Some(0) {
            return Err(ChatError::Config("default_k must be at least 1".to_string()));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ChatError::Config("poll_interval_ms must be at least 1".to_string()));
        }
        if self.max_concurrent_queries == Some(0) {
            return Err(ChatError::Config(
                "max_concurrent_queries must be at least 1 (omit it for no limit)".to_string(),
            ));
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatError::Config(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    t
                )));
            }
        }
        Ok(())
    }

    pub fn provider(&self) -> Provider {
        self.provider
            .as_deref()
            .and_then(|p| p.parse().ok())
            .unwrap_or(Provider::OpenAI)
    }

    pub fn model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| self.provider().default_model().to_string())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Env var first, then the config file.
    pub fn api_key(&self, provider: Provider) -> Option<String> {
        let from_env = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty());

        from_env.or_else(|| match provider {
            Provider::Claude => self.claude_api_key.clone(),
            Provider::OpenAI => self.openai_api_key.clone(),
            Provider::Ollama => None,
        })
    }

    pub fn ollama_url(&self) -> String {
        self.ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
    }

    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_DIR))
    }

    pub fn default_k(&self) -> usize {
        self.default_k.filter(|k| *k > 0).unwrap_or(DEFAULT_K)
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
    }

    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.clone().or_else(|| {
            dirs::data_local_dir().map(|p| p.join("ragbot").join("logs"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.provider(), Provider::OpenAI);
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.default_k(), 5);
        assert_eq!(config.poll_interval_ms(), 100);
        assert_eq!(config.index_dir(), PathBuf::from("Output"));
        assert!((config.temperature() - 0.7).abs() < f32::EPSILON);
        assert!(config.max_concurrent_queries.is_none());
    }

    #[test]
    fn test_model_follows_provider() {
        let config = Config {
            provider: Some("ollama".to_string()),
            ..Config::default()
        };
        assert_eq!(config.model(), "llama3.2:latest");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"provider": "claude", "default_k": 8}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider(), Provider::Claude);
        assert_eq!(config.default_k(), 8);
        assert_eq!(config.ollama_url(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            index_dir: Some(PathBuf::from("/data/index")),
            max_concurrent_queries: Some(4),
            ..Config::new()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            Config { provider: Some("gemini".into()), ..Config::new() },
            Config { default_k: Some(0), ..Config::new() },
            Config { poll_interval_ms: Some(0), ..Config::new() },
            Config { max_concurrent_queries: Some(0), ..Config::new() },
            Config { temperature: Some(3.5), ..Config::new() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
        assert!(Config::new().validate().is_ok());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        assert!(Config::new().api_key(Provider::Ollama).is_none());
    }
}
