//! LarvaCare configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CareError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LarvaCareConfig {
    /// Where batch and log collections live. `~` is expanded.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub sms: SmsConfig,
}

fn default_data_dir() -> String { "~/.larvacare/data".into() }

impl Default for LarvaCareConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

impl LarvaCareConfig {
    /// Load config from the default path (~/.larvacare/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CareError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CareError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scheduler;
        if s.check_interval_secs == 0 {
            return Err(CareError::Config("scheduler.check_interval_secs must be positive".into()));
        }
        if s.grace_minutes < 0 || s.cooldown_minutes < 0 {
            return Err(CareError::Config(
                "scheduler.grace_minutes and cooldown_minutes must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CareError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LARVACARE_DATA_DIR") {
            self.data_dir = v;
        }
        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.sms.account_sid = v;
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.sms.auth_token = v;
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.sms.from_number = v;
        }
    }

    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LarvaCare home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".larvacare")
    }
}

/// Which backend persists the batch and log collections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Json,
    Sqlite,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite file name inside `data_dir`.
    #[serde(default = "default_sqlite_file")]
    pub sqlite_file: String,
}

fn default_sqlite_file() -> String { "larvacare.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_file: default_sqlite_file(),
        }
    }
}

/// Overdue sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// How long past due a batch must be before it counts as overdue.
    #[serde(default = "default_grace_minutes")]
    pub grace_minutes: i64,
    /// Minimum gap between two automatic notifications for one batch.
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
}

fn default_check_interval() -> u64 { 300 }
fn default_grace_minutes() -> i64 { 60 }
fn default_cooldown_minutes() -> i64 { 240 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            grace_minutes: default_grace_minutes(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

/// SMS provider selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmsProvider {
    #[default]
    Twilio,
    Webhook,
    /// Dry run: messages are only written to the log.
    Log,
}

/// SMS delivery configuration. Credentials normally come from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    #[serde(default)]
    pub provider: SmsProvider,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub from_number: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_timeout() -> u64 { 10 }
fn default_api_base() -> String { "https://api.twilio.com".into() }

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            provider: SmsProvider::default(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            webhook_url: String::new(),
            timeout_secs: default_timeout(),
            api_base: default_api_base(),
        }
    }
}

impl SmsConfig {
    /// Whether the selected provider has everything it needs to send.
    pub fn is_configured(&self) -> bool {
        match self.provider {
            SmsProvider::Twilio => {
                !self.account_sid.is_empty()
                    && !self.auth_token.is_empty()
                    && !self.from_number.is_empty()
            }
            SmsProvider::Webhook => !self.webhook_url.is_empty(),
            SmsProvider::Log => true,
        }
    }
}
