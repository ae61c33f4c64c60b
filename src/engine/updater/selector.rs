//! Firmware Asset Selection
//!
//! Picks the OTA image for the device architecture out of the newest release
//! on the selected channel.

use super::catalog::{Asset, Release};
use crate::engine::config::Channel;
use thiserror::Error;

/// Every OTA image published for the product starts with this prefix
pub const ASSET_PREFIX: &str = "OTA_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No suitable releases found on the {channel} channel")]
    NoRelease { channel: Channel },
    #[error("No firmware for {architecture} in release {tag} (looking for *{expected_suffix})")]
    NoAsset {
        architecture: String,
        tag: String,
        expected_suffix: String,
    },
}

/// The release and image chosen for installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub release: Release,
    pub asset: Asset,
}

/// File name suffix an image for `architecture` must carry
pub fn expected_suffix(architecture: &str) -> String {
    format!("_{}.bin", architecture.to_lowercase())
}

/// Whether an asset is the OTA image for `architecture`
pub fn matches_architecture(asset: &Asset, architecture: &str) -> bool {
    asset.name.starts_with(ASSET_PREFIX) && asset.name.ends_with(&expected_suffix(architecture))
}

/// Select the newest qualifying release and its image for `architecture`.
///
/// Only the newest release is searched; an older release with a matching
/// image is never used in its place.
pub fn select_asset(
    releases: &[Release],
    architecture: &str,
    channel: Channel,
) -> Result<Selection, SelectionError> {
    let latest = releases
        .iter()
        .find(|r| channel.includes_prerelease() || !r.prerelease)
        .ok_or(SelectionError::NoRelease { channel })?;

    let asset = latest
        .assets
        .iter()
        .find(|a| matches_architecture(a, architecture))
        .ok_or_else(|| SelectionError::NoAsset {
            architecture: architecture.to_string(),
            tag: latest.tag.clone(),
            expected_suffix: expected_suffix(architecture),
        })?;

    Ok(Selection {
        release: latest.clone(),
        asset: asset.clone(),
    })
}
