use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::generation::GenerationConfig;
use crate::provider::Provider;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{provider} API key is not set. Export {var} or add it to {path}")]
    MissingCredential {
        provider: &'static str,
        var: &'static str,
        path: String,
    },
    #[error("unknown provider '{0}' (expected openai or claude)")]
    UnknownProvider(String),
}

/// Persisted user settings, `~/.config/moshimo/config.json`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub provider: Option<String>,
    pub default_model: Option<String>,
    pub base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub claude_api_key: Option<String>,
    pub last_persona: Option<String>,
    pub generation: Option<GenerationConfig>,
    pub timeout_secs: Option<u64>,
}

/// Command-line overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct BackendOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Everything needed to build a completion client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(config_path, config_content)?;
        Ok(())
    }

    pub fn save_last_persona(name: &str) -> Result<()> {
        Self::update_at(&Self::get_config_path()?, |config| {
            config.last_persona = Some(name.to_string());
        })
    }

    pub fn save_generation(generation: GenerationConfig) -> Result<()> {
        Self::update_at(&Self::get_config_path()?, |config| {
            config.generation = Some(generation);
        })
    }

    /// Read-modify-write of one file. A file that does not parse is left
    /// untouched so stored keys are never replaced by defaults.
    fn update_at(config_path: &Path, apply: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = Self::load_from(config_path).with_context(|| {
            format!("not overwriting unreadable config {}", config_path.display())
        })?;
        apply(&mut config);
        config.save_to(config_path)
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("moshimo"))
    }

    /// Resolve the backend from the process environment.
    pub fn resolve(&self, overrides: &BackendOverrides) -> Result<ResolvedBackend, ConfigError> {
        self.resolve_with(overrides, |var| {
            std::env::var(var).ok().filter(|v| !v.trim().is_empty())
        })
    }

    /// Precedence per setting: command line, then environment, then this file,
    /// then built-in defaults. The API key has no default.
    pub fn resolve_with(
        &self,
        overrides: &BackendOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<ResolvedBackend, ConfigError> {
        let provider_name = overrides
            .provider
            .clone()
            .or_else(|| env("MOSHIMO_PROVIDER"))
            .or_else(|| self.provider.clone());
        let provider = match provider_name {
            Some(name) => {
                Provider::from_str(&name).ok_or(ConfigError::UnknownProvider(name))?
            }
            None => Provider::default(),
        };

        let stored_key = match provider {
            Provider::OpenAI => self.openai_api_key.clone(),
            Provider::Claude => self.claude_api_key.clone(),
        };
        let api_key = env(provider.api_key_var())
            .or(stored_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: provider.display_name(),
                var: provider.api_key_var(),
                path: Self::get_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.json".to_string()),
            })?;

        let base_url = overrides
            .base_url
            .clone()
            .or_else(|| env(provider.base_url_var()))
            .or_else(|| self.base_url.clone());

        let model = overrides
            .model
            .clone()
            .or_else(|| env(provider.model_var()))
            .or_else(|| self.default_model.clone())
            .unwrap_or_else(|| provider.default_model().to_string());

        let timeout_secs = overrides
            .timeout_secs
            .or(self.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        // 0 disables the bound
        let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        Ok(ResolvedBackend {
            provider,
            api_key,
            base_url,
            model,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_missing_credential_is_an_error() {
        let err = Config::new()
            .resolve_with(&BackendOverrides::default(), env_from(&[]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { var: "OPENAI_API_KEY", .. }
        ));
    }

    #[test]
    fn test_defaults_with_env_key() {
        let backend = Config::new()
            .resolve_with(
                &BackendOverrides::default(),
                env_from(&[("OPENAI_API_KEY", "sk-env")]),
            )
            .unwrap();

        assert_eq!(backend.provider, Provider::OpenAI);
        assert_eq!(backend.api_key, "sk-env");
        assert_eq!(backend.model, "gpt-4o-mini");
        assert_eq!(backend.base_url, None);
        assert_eq!(backend.timeout, Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)));
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let config = Config {
            default_model: Some("file-model".to_string()),
            base_url: Some("http://file".to_string()),
            openai_api_key: Some("sk-file".to_string()),
            timeout_secs: Some(5),
            ..Default::default()
        };

        let env = env_from(&[
            ("OPENAI_MODEL", "env-model"),
            ("OPENAI_BASE_URL", "http://env"),
        ]);
        let backend = config
            .resolve_with(&BackendOverrides::default(), &env)
            .unwrap();
        assert_eq!(backend.api_key, "sk-file");
        assert_eq!(backend.model, "env-model");
        assert_eq!(backend.base_url.as_deref(), Some("http://env"));
        assert_eq!(backend.timeout, Some(Duration::from_secs(5)));

        let overrides = BackendOverrides {
            model: Some("cli-model".to_string()),
            base_url: Some("http://cli".to_string()),
            timeout_secs: Some(0),
            ..Default::default()
        };
        let backend = config.resolve_with(&overrides, &env).unwrap();
        assert_eq!(backend.model, "cli-model");
        assert_eq!(backend.base_url.as_deref(), Some("http://cli"));
        assert_eq!(backend.timeout, None);
    }

    #[test]
    fn test_provider_selection() {
        let env = env_from(&[("MOSHIMO_PROVIDER", "claude"), ("ANTHROPIC_API_KEY", "sk-ant")]);
        let backend = Config::new()
            .resolve_with(&BackendOverrides::default(), &env)
            .unwrap();
        assert_eq!(backend.provider, Provider::Claude);
        assert_eq!(backend.model, "claude-3-5-haiku-20241022");

        let overrides = BackendOverrides {
            provider: Some("ollama".to_string()),
            ..Default::default()
        };
        assert_eq!(
            Config::new().resolve_with(&overrides, &env).unwrap_err(),
            ConfigError::UnknownProvider("ollama".to_string())
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            last_persona: Some("Socrates".to_string()),
            generation: Some(GenerationConfig::new(1.0, 1024).unwrap()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.last_persona.as_deref(), Some("Socrates"));
        assert_eq!(loaded.generation, config.generation);
    }

    #[test]
    fn test_update_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        Config {
            openai_api_key: Some("sk-stored".to_string()),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        Config::update_at(&path, |config| config.last_persona = Some("Pirate".to_string()))
            .unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.openai_api_key.as_deref(), Some("sk-stored"));
        assert_eq!(loaded.last_persona.as_deref(), Some("Pirate"));
    }

    #[test]
    fn test_unreadable_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let original = r#"{"openai_api_key":"sk-stored","generation":{"temperature":2.0,"max_output_tokens":512}}"#;
        fs::write(&path, original).unwrap();

        let result = Config::update_at(&path, |config| {
            config.last_persona = Some("Pirate".to_string())
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.provider.is_none());
        assert!(loaded.generation.is_none());
    }
}
