//! Configuration management for Crosspost
//!
//! Configuration is a TOML file. Every section and field has a default, so
//! an empty (or missing) file yields a working configuration pointing at
//! the public platform endpoints.
//!
//! ```toml
//! [database]
//! path = "~/.local/share/crosspost/crosspost.db"
//!
//! [scheduler]
//! interval_secs = 60
//!
//! [platforms.facebook]
//! api_version = "v24.0"
//! app_id = "1234"
//! app_secret = "secret"
//!
//! [platforms.tiktok]
//! privacy_level = "SELF_ONLY"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

pub const CONFIG_ENV: &str = "CROSSPOST_CONFIG";
pub const FACEBOOK_APP_ID_ENV: &str = "CROSSPOST_FACEBOOK_APP_ID";
pub const FACEBOOK_APP_SECRET_ENV: &str = "CROSSPOST_FACEBOOK_APP_SECRET";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/crosspost/crosspost.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-post claims
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Attempt budget for an asynchronous-completion poll loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl PollConfig {
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PlatformsConfig {
    pub twitter: TwitterConfig,
    pub facebook: FacebookConfig,
    pub instagram: InstagramConfig,
    pub tiktok: TikTokConfig,
    pub youtube: YouTubeConfig,
    pub linkedin: LinkedInConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub api_base: String,
    pub upload_base: String,
    pub timeout_secs: u64,
    /// Size of each APPEND segment for chunked video upload
    pub chunk_size: usize,
    /// Fallback wait when STATUS omits `check_after_secs`
    pub status_poll: PollConfig,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.x.com".to_string(),
            upload_base: "https://upload.x.com".to_string(),
            timeout_secs: 120,
            chunk_size: 5 * 1024 * 1024,
            status_poll: PollConfig::new(30, 2_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FacebookConfig {
    pub enabled: bool,
    pub graph_base: String,
    pub api_version: String,
    pub timeout_secs: u64,
    /// App credentials for the long-lived token exchange
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    /// Concurrent unpublished photo uploads for an album post
    pub max_concurrent_uploads: usize,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            graph_base: "https://graph.facebook.com".to_string(),
            api_version: "v24.0".to_string(),
            timeout_secs: 120,
            app_id: None,
            app_secret: None,
            max_concurrent_uploads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstagramConfig {
    pub enabled: bool,
    pub graph_base: String,
    pub api_version: String,
    pub timeout_secs: u64,
    pub container_poll: PollConfig,
}

impl Default for InstagramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            graph_base: "https://graph.instagram.com".to_string(),
            api_version: "v24.0".to_string(),
            timeout_secs: 60,
            container_poll: PollConfig::new(10, 2_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TikTokConfig {
    pub enabled: bool,
    pub api_base: String,
    pub timeout_secs: u64,
    /// Requested privacy level; downgraded if the creator cannot use it
    pub privacy_level: String,
    pub status_poll: PollConfig,
}

impl Default for TikTokConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://open.tiktokapis.com".to_string(),
            timeout_secs: 300,
            privacy_level: "PUBLIC_TO_EVERYONE".to_string(),
            status_poll: PollConfig::new(15, 3_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct YouTubeConfig {
    pub enabled: bool,
    pub upload_base: String,
    pub timeout_secs: u64,
    pub privacy_status: String,
    pub category_id: String,
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upload_base: "https://www.googleapis.com".to_string(),
            timeout_secs: 600,
            privacy_status: "public".to_string(),
            category_id: "22".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkedInConfig {
    pub enabled: bool,
}

impl Default for LinkedInConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file is not an error: the defaults are used instead.
    /// Environment overrides are applied in both cases.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default_config()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Fill Facebook app secrets from the environment when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(app_id) = std::env::var(FACEBOOK_APP_ID_ENV) {
            if !app_id.is_empty() {
                self.platforms.facebook.app_id = Some(app_id);
            }
        }
        if let Ok(secret) = std::env::var(FACEBOOK_APP_SECRET_ENV) {
            if !secret.is_empty() {
                self.platforms.facebook.app_secret = Some(secret);
            }
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}
