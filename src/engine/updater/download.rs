//! Firmware Download
//!
//! Fetches firmware images through the download proxy. The device's browser
//! counterpart cannot reach the release CDN directly, so every image URL is
//! wrapped as `<proxy>?url=<encoded original>`.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound on the buffer reserved from an announced Content-Length
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Proxy error: {status} {reason}")]
    Status { status: u16, reason: String },
    #[error("Invalid download URL: {0}")]
    InvalidUrl(String),
}

/// A downloaded firmware image held in memory
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    pub bytes: Vec<u8>,
    pub sha256: String,
}

impl FirmwareImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let sha256 = hex::encode(Sha256::digest(&bytes));
        Self { bytes, sha256 }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Source of firmware binaries
#[async_trait]
pub trait FirmwareSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FirmwareImage, DownloadError>;
}

/// Wrap an asset URL in the download proxy
pub fn proxied_url(proxy: &str, asset_url: &str) -> Result<String, DownloadError> {
    let mut url = url::Url::parse(proxy).map_err(|e| DownloadError::InvalidUrl(e.to_string()))?;
    url.query_pairs_mut().clear().append_pair("url", asset_url);
    Ok(url.to_string())
}

/// HTTP downloader for firmware images
pub struct FirmwareDownloader {
    client: reqwest::Client,
}

impl FirmwareDownloader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download a URL into memory, reporting `(downloaded, total)` per chunk.
    /// `total` is 0 when the server does not announce a length.
    pub async fn download<F>(&self, url: &str, mut on_progress: F) -> Result<FirmwareImage, DownloadError>
    where
        F: FnMut(u64, u64),
    {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let total_size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let mut bytes = Vec::with_capacity(total_size.min(MAX_PREALLOC) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::Network(e.to_string()))?;
            bytes.extend_from_slice(&chunk);
            on_progress(bytes.len() as u64, total_size);
        }

        let image = FirmwareImage::new(bytes);
        info!(size = image.len(), sha256 = %image.sha256, "Firmware downloaded");
        Ok(image)
    }
}

impl Default for FirmwareDownloader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl FirmwareSource for FirmwareDownloader {
    async fn fetch(&self, url: &str) -> Result<FirmwareImage, DownloadError> {
        debug!(%url, "Downloading firmware");
        self.download(url, |_, _| {}).await
    }
}
