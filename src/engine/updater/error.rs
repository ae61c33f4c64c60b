//! Update failure and rejection types

use super::catalog::FetchError;
use super::confirm::GateError;
use super::download::DownloadError;
use super::selector::SelectionError;
use super::state::SessionState;
use super::upload::UploadError;
use crate::engine::config::Channel;
use thiserror::Error;

/// Why a session ended in `Failed`
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Unknown build architecture. Cannot check for updates.")]
    UnknownArchitecture,
    #[error("Failed to fetch releases: {0}")]
    Fetch(#[from] FetchError),
    #[error("No suitable releases found on the {channel} channel")]
    NoRelease { channel: Channel },
    #[error("No firmware for {architecture} in release {tag} (looking for *{expected_suffix})")]
    NoAsset {
        architecture: String,
        tag: String,
        expected_suffix: String,
    },
    #[error("Download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("Network error during upload. Device might have rebooted unexpectedly ({0})")]
    UploadTransport(String),
    #[error("Flash failed: {0}")]
    UploadRejected(String),
    #[error("Update interrupted while {state}")]
    Interrupted { state: SessionState },
}

impl UpdateError {
    /// Failures raised while the device was being written
    pub fn during_flash(&self) -> bool {
        match self {
            UpdateError::Download(_) | UpdateError::UploadTransport(_) | UpdateError::UploadRejected(_) => true,
            UpdateError::Interrupted { state } => state.is_flashing(),
            _ => false,
        }
    }
}

impl From<SelectionError> for UpdateError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::NoRelease { channel } => UpdateError::NoRelease { channel },
            SelectionError::NoAsset {
                architecture,
                tag,
                expected_suffix,
            } => UpdateError::NoAsset {
                architecture,
                tag,
                expected_suffix,
            },
        }
    }
}

impl From<UploadError> for UpdateError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Network(reason) => UpdateError::UploadTransport(reason),
            UploadError::Rejected { detail, .. } => UpdateError::UploadRejected(detail),
        }
    }
}

/// Calls the session refuses without changing state
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is busy ({state})")]
    Busy { state: SessionState },
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error(transparent)]
    Gate(#[from] GateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_failures() {
        assert!(UpdateError::UploadRejected("FAIL".into()).during_flash());
        assert!(UpdateError::from(UploadError::Network("reset".into())).during_flash());
        assert!(!UpdateError::UnknownArchitecture.during_flash());
        assert!(!UpdateError::NoRelease {
            channel: Channel::Stable
        }
        .during_flash());
        assert!(UpdateError::Interrupted {
            state: SessionState::Uploading
        }
        .during_flash());
        assert!(!UpdateError::Interrupted {
            state: SessionState::Checking
        }
        .during_flash());
    }

    #[test]
    fn test_selection_mapping() {
        let err: UpdateError = SelectionError::NoAsset {
            architecture: "ESP99".into(),
            tag: "1.5.0".into(),
            expected_suffix: "_esp99.bin".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "No firmware for ESP99 in release 1.5.0 (looking for *_esp99.bin)"
        );
    }

    #[test]
    fn test_rejected_carries_detail() {
        let err: UpdateError = UploadError::Rejected {
            status: 500,
            detail: "FAIL".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Flash failed: FAIL");
    }
}
