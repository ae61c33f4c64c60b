//! Update Session State
//!
//! States of the OTA session and the data that is valid in each of them.

use super::catalog::Asset;
use super::version::ordering_sign;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Direction of an available firmware change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Remote release is newer than the device
    Upgrade,
    /// Remote release is older than the device
    Downgrade,
}

impl UpdateKind {
    /// Classify a local-vs-remote comparison. `Equal` means nothing to do.
    pub fn from_comparison(local_vs_remote: Ordering) -> Option<Self> {
        match local_vs_remote {
            Ordering::Less => Some(UpdateKind::Upgrade),
            Ordering::Greater => Some(UpdateKind::Downgrade),
            Ordering::Equal => None,
        }
    }

    /// Label of the install action
    pub fn action_label(self) -> &'static str {
        match self {
            UpdateKind::Upgrade => "Install Update",
            UpdateKind::Downgrade => "Downgrade Firmware",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            UpdateKind::Upgrade => "upgrade",
            UpdateKind::Downgrade => "downgrade",
        }
    }

    pub fn warning(self) -> Option<&'static str> {
        match self {
            UpdateKind::Upgrade => None,
            UpdateKind::Downgrade => Some("Warning: this is a downgrade!"),
        }
    }
}

/// Current state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Checking,
    UpToDate,
    Available(UpdateKind),
    AwaitingConfirmation,
    Downloading,
    Uploading,
    Succeeded,
    Failed,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl SessionState {
    /// States during which no other operation may start
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            SessionState::Checking
                | SessionState::AwaitingConfirmation
                | SessionState::Downloading
                | SessionState::Uploading
        )
    }

    /// States during which the device is being written
    pub fn is_flashing(self) -> bool {
        matches!(self, SessionState::Downloading | SessionState::Uploading)
    }

    /// End of a cycle; a new check may start from here
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::UpToDate | SessionState::Succeeded | SessionState::Failed
        )
    }

    pub fn can_check(self) -> bool {
        !self.is_busy()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Checking => write!(f, "checking"),
            SessionState::UpToDate => write!(f, "up to date"),
            SessionState::Available(kind) => write!(f, "{} available", kind.verb()),
            SessionState::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            SessionState::Downloading => write!(f, "downloading"),
            SessionState::Uploading => write!(f, "uploading"),
            SessionState::Succeeded => write!(f, "succeeded"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Point-in-time copy of the whole session aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub local_version: Option<String>,
    pub remote_version: Option<String>,
    /// -1 (remote newer), 0 or +1 (remote older); only set when both
    /// versions are known
    pub comparison: Option<i8>,
    pub selected_asset: Option<Asset>,
    pub firmware_url: Option<String>,
    pub progress_percent: u8,
    pub status: String,
    pub failure: Option<String>,
}

impl SessionSnapshot {
    pub fn comparison_ordering(&self) -> Option<Ordering> {
        self.comparison.map(|c| c.cmp(&0))
    }

    pub fn set_comparison(&mut self, ordering: Option<Ordering>) {
        self.comparison = ordering.map(ordering_sign);
    }

    pub fn update_kind(&self) -> Option<UpdateKind> {
        match self.state {
            SessionState::Available(kind) => Some(kind),
            _ => self
                .comparison_ordering()
                .and_then(UpdateKind::from_comparison),
        }
    }

    /// Label for the install action while an update is on offer
    pub fn action_label(&self) -> Option<&'static str> {
        match self.state {
            SessionState::Available(kind) => Some(kind.action_label()),
            _ => None,
        }
    }
}
