//! OTAFlow Configuration Module
//! Handles loading and validating otaflow.config.json

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_FILE: &str = "otaflow.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Unknown config key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// Update channel; `testing` also offers pre-releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    #[default]
    Stable,
    Testing,
}

impl Channel {
    pub fn includes_prerelease(self) -> bool {
        matches!(self, Channel::Testing)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Stable => write!(f, "stable"),
            Channel::Testing => write!(f, "testing"),
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stable" => Ok(Channel::Stable),
            "testing" => Ok(Channel::Testing),
            other => Err(format!("expected 'stable' or 'testing', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub device: DeviceConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base URL of the device web server, e.g. `http://192.168.4.1`
    pub url: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "default_release_url")]
    pub release_url: String,
    #[serde(default = "default_fallback_release_url")]
    pub fallback_release_url: String,
    #[serde(default = "default_download_proxy_url")]
    pub download_proxy_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Unset means the HTTP client's own defaults apply
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_release_url() -> String {
    "https://hyperk-github-releases-api-proxy.hyperhdr.workers.dev/".to_string()
}

fn default_fallback_release_url() -> String {
    crate::engine::updater::catalog::github_releases_url("awawa-dev", "Hyperk")
}

fn default_download_proxy_url() -> String {
    "https://hyperhdr-github-proxy.hyperhdr.workers.dev/".to_string()
}

fn default_user_agent() -> String {
    format!("OTAFlow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            channel: Channel::default(),
            release_url: default_release_url(),
            fallback_release_url: default_fallback_release_url(),
            download_proxy_url: default_download_proxy_url(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: None,
        }
    }
}

impl Config {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FILE)
    }

    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let config_path = Self::path(dir);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, dir: &Path) -> Result<(), ConfigError> {
        let config_path = Self::path(dir);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_device(url: &str) -> Self {
        Self {
            version: "1".to_string(),
            device: DeviceConfig {
                url: url.trim_end_matches('/').to_string(),
                architecture: None,
                firmware_version: None,
            },
            update: UpdateConfig::default(),
            http: HttpConfig::default(),
        }
    }

    /// Set a single value by dotted key (`device.url`, `update.channel`, ...)
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };

        match key {
            "device.url" => self.device.url = value.trim().trim_end_matches('/').to_string(),
            "device.architecture" => self.device.architecture = optional(value),
            "device.firmware_version" => self.device.firmware_version = optional(value),
            "update.channel" => {
                self.update.channel =
                    value.parse().map_err(|reason| ConfigError::InvalidValue {
                        key: key.to_string(),
                        reason,
                    })?
            }
            "update.release_url" => self.update.release_url = value.trim().to_string(),
            "update.fallback_release_url" => {
                self.update.fallback_release_url = value.trim().to_string()
            }
            "update.download_proxy_url" => {
                self.update.download_proxy_url = value.trim().to_string()
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// Build the shared HTTP client described by the `http` section
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(&self.http.user_agent);
        if let Some(secs) = self.http.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        builder.build()
    }
}
