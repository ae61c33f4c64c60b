//! Device Firmware Updater
//!
//! Over-the-air update orchestration for a single LED controller.
//!
//! Components:
//! - `version` - Version comparison
//! - `catalog` - Release list with fallback source
//! - `selector` - Pick the firmware asset for an architecture
//! - `download` - Fetch firmware through the download proxy
//! - `upload` - Multipart upload to the device with progress
//! - `confirm` - Single-slot yes/no gate
//! - `state` - Session states and snapshot
//! - `signals` - Observer interface for status, progress and guards
//! - `session` - The update state machine

pub mod catalog;
pub mod confirm;
pub mod download;
pub mod error;
pub mod selector;
pub mod session;
pub mod signals;
pub mod state;
pub mod upload;
pub mod version;

pub use catalog::{Asset, FetchError, Release, ReleaseCatalog, ReleaseFeed};
pub use confirm::{ConfirmationGate, Decision, GateError};
pub use download::{DownloadError, FirmwareDownloader, FirmwareImage, FirmwareSource};
pub use error::{SessionError, UpdateError};
pub use selector::{select_asset, Selection, SelectionError};
pub use session::{SessionSettings, UpdateSession};
pub use signals::{NoopObserver, Observers, SessionObserver, SignalBoard};
pub use state::{SessionSnapshot, SessionState, UpdateKind};
pub use upload::{DeviceUploader, UploadError, UploadMetadata, UploadTransport};
pub use version::{compare_versions, UNKNOWN_VERSION};

use crate::engine::config::Config;
use std::sync::Arc;

/// Build a session talking to the real release sources and device
pub fn session_from_config(config: &Config) -> reqwest::Result<UpdateSession> {
    let client = config.http_client()?;
    let catalog = ReleaseCatalog::new(
        client.clone(),
        &config.update.release_url,
        &config.update.fallback_release_url,
    )
    .with_user_agent(&config.http.user_agent);

    Ok(UpdateSession::new(
        SessionSettings::from_config(config),
        Arc::new(catalog),
        Arc::new(FirmwareDownloader::new(client.clone())),
        Arc::new(DeviceUploader::new(client)),
    ))
}
