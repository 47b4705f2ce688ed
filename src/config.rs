//! Configuration management for Colloquy
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{ColloquyError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for Colloquy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote completion service settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Conversation session settings
    #[serde(default)]
    pub session: SessionConfig,
    /// History store settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Completion service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Model requested for both replies and title suggestions
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// TCP connect timeout (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Timeout for non-streaming requests such as title suggestions (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            connect_timeout_seconds: default_connect_timeout(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// Conversation session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Instruction sent first on every new conversation, never stored
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Prefix of the title-suggestion request
    #[serde(default = "default_title_prompt_prefix")]
    pub title_prompt_prefix: String,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_title_prompt_prefix() -> String {
    "suggest me a short title for ".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            title_prompt_prefix: default_title_prompt_prefix(),
        }
    }
}

/// History store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `history.db` and `history.lock`
    ///
    /// Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// How long to wait for another process to release the store
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Delay between lock attempts
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

fn default_lock_poll_interval_ms() -> u64 {
    50
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            lock_timeout_ms: default_lock_timeout_ms(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
        }
    }
}

impl StorageConfig {
    /// Lock wait budget as a `Duration`
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Lock polling interval as a `Duration`
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }
}

impl Config {
    /// Default configuration file location
    ///
    /// `<platform config dir>/colloquy/config.yaml`, or `None` when the
    /// platform offers no home directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "colloquy", "colloquy")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &Path, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ColloquyError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ColloquyError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_base) = std::env::var("COLLOQUY_API_BASE") {
            tracing::debug!(api_base = %api_base, "Env override: COLLOQUY_API_BASE");
            self.provider.api_base = api_base;
        }

        if let Ok(model) = std::env::var("COLLOQUY_MODEL") {
            tracing::debug!(model = %model, "Env override: COLLOQUY_MODEL");
            self.provider.model = model;
        }

        if let Ok(data_dir) = std::env::var("COLLOQUY_DATA_DIR") {
            tracing::debug!(data_dir = %data_dir, "Env override: COLLOQUY_DATA_DIR");
            self.storage.data_dir = Some(PathBuf::from(data_dir));
        }

        if let Ok(timeout) = std::env::var("COLLOQUY_LOCK_TIMEOUT_MS") {
            if let Ok(v) = timeout.parse() {
                self.storage.lock_timeout_ms = v;
            } else {
                tracing::warn!("Invalid COLLOQUY_LOCK_TIMEOUT_MS: {}", timeout);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(dir) = &cli.data_dir {
            self.storage.data_dir = Some(dir.clone());
        }

        if let crate::cli::Commands::Chat {
            model: Some(model), ..
        } = &cli.command
        {
            self.provider.model = model.clone();
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.provider.model.trim().is_empty() {
            return Err(ColloquyError::Config("provider.model cannot be empty".to_string()).into());
        }

        let api_base = self.provider.api_base.trim();
        if api_base.is_empty() {
            return Err(
                ColloquyError::Config("provider.api_base cannot be empty".to_string()).into(),
            );
        }

        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(ColloquyError::Config(format!(
                "provider.api_base must be an http(s) URL: {}",
                api_base
            ))
            .into());
        }

        if self.provider.api_key_env.trim().is_empty() {
            return Err(
                ColloquyError::Config("provider.api_key_env cannot be empty".to_string()).into(),
            );
        }

        if self.provider.connect_timeout_seconds == 0 || self.provider.request_timeout_seconds == 0
        {
            return Err(ColloquyError::Config(
                "provider timeouts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.title_prompt_prefix.trim().is_empty() {
            return Err(ColloquyError::Config(
                "session.title_prompt_prefix cannot be empty".to_string(),
            )
            .into());
        }

        if self.storage.lock_timeout_ms == 0 || self.storage.lock_poll_interval_ms == 0 {
            return Err(ColloquyError::Config(
                "storage lock timeout and poll interval must be greater than 0".to_string(),
            )
            .into());
        }

        if self.storage.lock_poll_interval_ms > self.storage.lock_timeout_ms {
            return Err(ColloquyError::Config(
                "storage.lock_poll_interval_ms must not exceed storage.lock_timeout_ms"
                    .to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Read the API key from the configured environment variable
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::MissingApiKey` if the variable is unset or blank
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.provider.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(ColloquyError::MissingApiKey(self.provider.api_key_env.clone()).into()),
        }
    }

    /// Directory holding the history database and its lock file
    ///
    /// # Errors
    ///
    /// Returns `ColloquyError::Storage` if no data directory can be determined
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_dir {
            return Ok(dir.clone());
        }

        ProjectDirs::from("dev", "colloquy", "colloquy")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                ColloquyError::Storage("Could not determine data directory".into()).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.storage.lock_timeout_ms, 1000);
        assert_eq!(config.storage.lock_poll_interval_ms, 50);
        assert_eq!(
            config.session.title_prompt_prefix,
            "suggest me a short title for "
        );
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_model() {
        let mut config = Config::default();
        config.provider.model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_non_http_api_base() {
        let mut config = Config::default();
        config.provider.api_base = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_lock_timeout() {
        let mut config = Config::default();
        config.storage.lock_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_poll_longer_than_timeout() {
        let mut config = Config::default();
        config.storage.lock_timeout_ms = 40;
        config.storage.lock_poll_interval_ms = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
provider:
  api_base: http://localhost:8080/v1
  model: gpt-4o-mini
session:
  system_prompt: Answer briefly.
storage:
  data_dir: /tmp/colloquy-test
  lock_timeout_ms: 250
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider.api_base, "http://localhost:8080/v1");
        assert_eq!(config.provider.model, "gpt-4o-mini");
        assert_eq!(config.provider.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.session.system_prompt, "Answer briefly.");
        assert_eq!(
            config.session.title_prompt_prefix,
            "suggest me a short title for "
        );
        assert_eq!(
            config.storage.data_dir,
            Some(PathBuf::from("/tmp/colloquy-test"))
        );
        assert_eq!(config.storage.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.storage.lock_poll_interval(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_empty_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.provider.model, "gpt-3.5-turbo");
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults_and_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "colloquy",
            "--data-dir",
            "/tmp/override",
            "chat",
            "--model",
            "gpt-4o",
        ])
        .unwrap();
        let config = Config::load(&dir.path().join("missing.yaml"), &cli).unwrap();
        assert_eq!(config.provider.model, "gpt-4o");
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/tmp/override")));
    }

    #[test]
    #[serial]
    fn test_load_reads_file_and_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "provider:\n  model: from-file\n").unwrap();

        std::env::set_var("COLLOQUY_LOCK_TIMEOUT_MS", "300");
        let cli = Cli::try_parse_from(["colloquy", "history", "list"]).unwrap();
        let config = Config::load(&path, &cli).unwrap();
        std::env::remove_var("COLLOQUY_LOCK_TIMEOUT_MS");

        assert_eq!(config.provider.model, "from-file");
        assert_eq!(config.storage.lock_timeout_ms, 300);
        assert!(matches!(cli.command, Commands::History { .. }));
    }

    #[test]
    #[serial]
    fn test_invalid_env_lock_timeout_ignored() {
        std::env::set_var("COLLOQUY_LOCK_TIMEOUT_MS", "soon");
        let mut config = Config::default();
        config.apply_env_vars();
        std::env::remove_var("COLLOQUY_LOCK_TIMEOUT_MS");
        assert_eq!(config.storage.lock_timeout_ms, 1000);
    }

    #[test]
    fn test_load_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "provider: [unclosed").unwrap();
        let cli = Cli::try_parse_from(["colloquy", "history", "list"]).unwrap();
        let err = Config::load(&path, &cli).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColloquyError>(),
            Some(ColloquyError::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_api_key_missing() {
        let mut config = Config::default();
        config.provider.api_key_env = "COLLOQUY_TEST_UNSET_KEY".to_string();
        std::env::remove_var("COLLOQUY_TEST_UNSET_KEY");
        let err = config.api_key().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ColloquyError>(),
            Some(ColloquyError::MissingApiKey(name)) if name == "COLLOQUY_TEST_UNSET_KEY"
        ));
    }

    #[test]
    #[serial]
    fn test_api_key_blank_is_missing() {
        let mut config = Config::default();
        config.provider.api_key_env = "COLLOQUY_TEST_BLANK_KEY".to_string();
        std::env::set_var("COLLOQUY_TEST_BLANK_KEY", "   ");
        assert!(config.api_key().is_err());
        std::env::set_var("COLLOQUY_TEST_BLANK_KEY", "sk-test");
        assert_eq!(config.api_key().unwrap(), "sk-test");
        std::env::remove_var("COLLOQUY_TEST_BLANK_KEY");
    }

    #[test]
    fn test_data_dir_prefers_configured() {
        let mut config = Config::default();
        config.storage.data_dir = Some(PathBuf::from("/var/tmp/colloquy"));
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/var/tmp/colloquy"));
    }
}
