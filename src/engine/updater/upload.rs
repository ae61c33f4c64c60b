//! Device Upload Transport
//!
//! Streams a firmware image to the device's `/ota` endpoint as multipart
//! form data, reporting integer progress percentages as the body is consumed.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const FIRMWARE_SIZE_HEADER: &str = "hyperk-ota-firmware-size";
pub const FIRMWARE_NAME_HEADER: &str = "hyperk-ota-firmware-name";
pub const UPLOAD_FIELD: &str = "update";
pub const UPLOAD_FILE_NAME: &str = "firmware.bin";

const CHUNK_SIZE: usize = 16 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Network error during upload. Device might have rebooted unexpectedly ({0})")]
    Network(String),
    #[error("Rejected by device: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Side-channel data the device validates before committing to flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadMetadata {
    pub size: usize,
    pub firmware_name: String,
}

/// Tracks the last emitted percentage so reports never go backwards
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage for `sent` of `total`, or `None` if it would not advance
    pub fn advance(&mut self, sent: u64, total: u64) -> Option<u8> {
        let percent = if total == 0 {
            100
        } else {
            ((sent.min(total) as f64 / total as f64) * 100.0).round() as u8
        };
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            }
        }
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Binary transfer to the device
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Send `payload` to `url`. `on_progress` receives strictly increasing
    /// percentages in `0..=100`.
    async fn send(
        &self,
        url: &str,
        payload: Vec<u8>,
        metadata: &UploadMetadata,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<(), UploadError>;
}

/// `POST <device>/ota` uploader
pub struct DeviceUploader {
    client: reqwest::Client,
}

impl DeviceUploader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for DeviceUploader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

/// Install endpoint of a device
pub fn ota_endpoint(device_url: &str) -> String {
    format!("{}/ota", device_url.trim_end_matches('/'))
}

#[async_trait]
impl UploadTransport for DeviceUploader {
    async fn send(
        &self,
        url: &str,
        payload: Vec<u8>,
        metadata: &UploadMetadata,
        on_progress: &mut (dyn FnMut(u8) + Send),
    ) -> Result<(), UploadError> {
        let total = payload.len() as u64;
        let chunks: Vec<Vec<u8>> = payload.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let mut sent: u64 = 0;
        let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            let _ = tx.send(sent);
            Ok::<_, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str("application/octet-stream")
            .map_err(|e| UploadError::Network(e.to_string()))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        debug!(%url, size = metadata.size, name = %metadata.firmware_name, "Uploading firmware");

        let request = self
            .client
            .post(url)
            .header(FIRMWARE_SIZE_HEADER, metadata.size.to_string())
            .header(FIRMWARE_NAME_HEADER, &metadata.firmware_name)
            .multipart(form)
            .send();
        tokio::pin!(request);

        let mut tracker = ProgressTracker::new();
        let mut report = |sent: u64| {
            if let Some(percent) = tracker.advance(sent, total) {
                on_progress(percent);
            }
        };

        let result = loop {
            tokio::select! {
                result = &mut request => break result,
                Some(sent) = rx.recv() => report(sent),
            }
        };
        while let Ok(sent) = rx.try_recv() {
            report(sent);
        }

        let response = result.map_err(|e| {
            warn!(error = %e, "Upload transport failure");
            UploadError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.as_u16() == 200 {
            info!("Device accepted firmware");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.trim().to_string()
        };
        warn!(status = status.as_u16(), %detail, "Device rejected firmware");
        Err(UploadError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}
