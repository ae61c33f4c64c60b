//! Device probe
//!
//! Reads the controller's `/api/stats` document. Used to discover the
//! build architecture when none is configured.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device unreachable: {0}")]
    Network(String),
    #[error("Device answered HTTP {0}")]
    Status(u16),
    #[error("Unexpected stats document: {0}")]
    Decode(String),
}

/// Runtime statistics reported by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct DeviceStats {
    pub device: String,
    pub ip: String,
    pub rssi: String,
    /// Seconds since boot
    pub uptime: String,
    pub heap: String,
    pub arch: String,
    #[serde(default)]
    pub fps: u32,
    #[serde(default)]
    pub skipped: u32,
}

pub struct DeviceClient {
    client: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn stats_url(&self) -> String {
        format!("{}/api/stats", self.base_url)
    }

    pub async fn stats(&self) -> Result<DeviceStats, DeviceError> {
        let url = self.stats_url();
        debug!(url = %url, "Probing device");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DeviceError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| DeviceError::Decode(e.to_string()))
    }
}
