use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::{AuthMode, MODIFY_SCOPE};
use crate::error::{RelayError, Result};
use crate::i18n::Language;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Chat ids that receive every notification
    #[serde(default)]
    pub allowed_user_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            token_file: default_token_file(),
            scopes: default_scopes(),
            query: default_query(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default = "default_oauth_port")]
    pub port: u16,
    /// Host shown in the headless hint, e.g. `vps.example.com:8080`
    #[serde(default)]
    pub external_host: String,
    /// Run interactive authorization from inside the polling loop
    #[serde(default)]
    pub reauth_while_running: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            port: default_oauth_port(),
            external_host: String::new(),
            reauth_while_running: false,
        }
    }
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_scopes() -> Vec<String> {
    vec![MODIFY_SCOPE.to_string()]
}

fn default_query() -> String {
    "from:anthropic.com OR from:claude.ai is:unread".to_string()
}

fn default_max_results() -> u32 {
    10
}

fn default_check_interval_secs() -> u64 {
    15
}

fn default_retry_delay_secs() -> u64 {
    30
}

fn default_oauth_port() -> u16 {
    8080
}

impl Config {
    /// Load the config file and apply environment overrides
    ///
    /// A missing file yields defaults; validation is left to the caller
    /// since not every command needs a complete configuration.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                RelayError::ConfigError(format!("Failed to read config file: {}", e))
            })?;

            let config: Self = toml::from_str(&content).map_err(|e| {
                RelayError::ConfigError(format!("Failed to parse config file: {}", e))
            })?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override secrets and deployment details from the environment
    ///
    /// Recognizes `TELEGRAM_BOT_TOKEN`, `OAUTH_PORT` and `OAUTH_EXTERNAL_HOST`.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env("TELEGRAM_BOT_TOKEN").filter(|v| !v.is_empty()) {
            self.telegram.bot_token = token;
        }

        if let Some(port) = env("OAUTH_PORT") {
            match port.trim().parse() {
                Ok(port) => self.auth.port = port,
                Err(_) => tracing::warn!("Ignoring invalid OAUTH_PORT value {:?}", port),
            }
        }

        if let Some(host) = env("OAUTH_EXTERNAL_HOST").filter(|v| !v.is_empty()) {
            self.auth.external_host = host;
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RelayError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RelayError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| RelayError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Every problem with the configuration, empty when it is usable
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.telegram.bot_token.trim().is_empty() {
            errors.push("telegram.bot_token is not set (or TELEGRAM_BOT_TOKEN)".to_string());
        }
        if self.telegram.allowed_user_ids.is_empty() {
            errors.push("telegram.allowed_user_ids must list at least one chat id".to_string());
        }

        if self.gmail.credentials_file.as_os_str().is_empty() {
            errors.push("gmail.credentials_file cannot be empty".to_string());
        }
        if self.gmail.token_file.as_os_str().is_empty() {
            errors.push("gmail.token_file cannot be empty".to_string());
        }
        if self.gmail.query.trim().is_empty() {
            errors.push("gmail.query cannot be empty".to_string());
        }
        if !(1..=500).contains(&self.gmail.max_results) {
            errors.push("gmail.max_results must be between 1 and 500".to_string());
        }
        if self.gmail.scopes.iter().all(|s| s.trim().is_empty()) {
            errors.push("gmail.scopes must contain at least one scope".to_string());
        }

        if self.monitor.check_interval_secs == 0 {
            errors.push("monitor.check_interval_secs must be at least 1".to_string());
        }
        if self.monitor.retry_delay_secs == 0 {
            errors.push("monitor.retry_delay_secs must be at least 1".to_string());
        }

        errors
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            tracing::debug!("Configuration validation passed");
            return Ok(());
        }

        Err(RelayError::ConfigError(errors.join("; ")))
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let mut config = Self::default();
        config.telegram.bot_token = "123456789:REPLACE_WITH_BOT_TOKEN".to_string();
        config.telegram.allowed_user_ids = vec![123456789];
        config.save(path).await
    }
}
