//! Release Catalog
//!
//! Fetches published firmware releases. The primary source is a caching
//! release proxy; the GitHub releases API is the fallback. Both return the
//! same JSON shape.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    /// Bytes, as reported by the release source
    #[serde(default)]
    pub size: u64,
}

/// A published firmware release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Release source {url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Release source {url} unreachable: {reason}")]
    Network { url: String, reason: String },
    #[error("Release source {url} returned malformed data: {reason}")]
    Decode { url: String, reason: String },
    #[error("All release sources failed (primary: {primary}; fallback: {fallback})")]
    Exhausted {
        primary: Box<FetchError>,
        fallback: Box<FetchError>,
    },
}

/// Anything that can produce the list of published releases, newest first
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn fetch_releases(&self) -> Result<Vec<Release>, FetchError>;
}

/// HTTP release catalog with a single fallback
pub struct ReleaseCatalog {
    client: reqwest::Client,
    primary_url: String,
    fallback_url: String,
    user_agent: String,
}

impl ReleaseCatalog {
    pub fn new(client: reqwest::Client, primary_url: &str, fallback_url: &str) -> Self {
        Self {
            client,
            primary_url: primary_url.to_string(),
            fallback_url: fallback_url.to_string(),
            user_agent: "OTAFlow".to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    pub fn fallback_url(&self) -> &str {
        &self.fallback_url
    }

    async fn fetch_from(&self, url: &str) -> Result<Vec<Release>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .json::<Vec<Release>>()
            .await
            .map_err(|e| FetchError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ReleaseFeed for ReleaseCatalog {
    async fn fetch_releases(&self) -> Result<Vec<Release>, FetchError> {
        let primary = match self.fetch_from(&self.primary_url).await {
            Ok(releases) => {
                info!(count = releases.len(), "Releases fetched from release proxy");
                return Ok(releases);
            }
            Err(e) => e,
        };

        warn!(error = %primary, "Release proxy failed, falling back to GitHub API");

        match self.fetch_from(&self.fallback_url).await {
            Ok(releases) => {
                debug!(count = releases.len(), "Releases fetched from fallback source");
                Ok(releases)
            }
            Err(fallback) => Err(FetchError::Exhausted {
                primary: Box::new(primary),
                fallback: Box::new(fallback),
            }),
        }
    }
}

/// GitHub releases API endpoint for a repository
pub fn github_releases_url(owner: &str, repo: &str) -> String {
    format!("https://api.github.com/repos/{}/{}/releases", owner, repo)
}
