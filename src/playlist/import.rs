//! Playlist import: fetch, parse, and replace a source's channels

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::db::ChannelRepo;

/// Upper bound on fetching a remote playlist
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from importing a playlist
#[derive(Debug, Error)]
pub enum ImportError {
    /// Source URL is not an absolute http(s) URL
    #[error("invalid playlist url: {0}")]
    InvalidUrl(String),

    /// Request could not be sent or the body could not be read
    #[error("failed to fetch playlist: {0}")]
    Fetch(#[from] reqwest::Error),

    /// Playlist host answered with a non-200 status
    #[error("failed to fetch playlist: status {0}")]
    Status(u16),

    /// Nothing parseable in the playlist
    #[error("no valid channels found in playlist")]
    Empty,

    /// Storing the parsed channels failed
    #[error("failed to save channels: {0}")]
    Store(#[from] crate::Error),
}

/// Result of a successful import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported_count: usize,
    pub source_url: String,
}

/// Imports remote playlists into the channel catalog
#[derive(Clone)]
pub struct PlaylistImporter {
    client: reqwest::Client,
    channels: ChannelRepo,
}

impl PlaylistImporter {
    /// Create an importer writing into the given repository
    #[must_use]
    pub fn new(channels: ChannelRepo) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client, channels }
    }

    /// Fetch the playlist at `source_url` and replace its channels
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid, the fetch fails, the playlist
    /// holds no channels, or storing them fails
    pub async fn import(&self, source_url: &str) -> Result<ImportSummary, ImportError> {
        let url = url::Url::parse(source_url)
            .map_err(|e| ImportError::InvalidUrl(format!("{source_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImportError::InvalidUrl(format!(
                "{source_url}: unsupported scheme {}",
                url.scheme()
            )));
        }

        let response = self.client.get(url).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(ImportError::Status(response.status().as_u16()));
        }
        let body = response.text().await?;

        self.import_text(source_url, &body)
    }

    /// Parse already-fetched playlist text and replace its channels
    ///
    /// # Errors
    ///
    /// Returns error if the playlist holds no channels or storing them fails
    pub fn import_text(&self, source_url: &str, body: &str) -> Result<ImportSummary, ImportError> {
        let entries = super::parse(body);
        if entries.is_empty() {
            return Err(ImportError::Empty);
        }

        let imported_count = self.channels.replace_source(source_url, &entries)?;
        tracing::info!(source_url = %source_url, imported_count, "playlist imported");

        Ok(ImportSummary {
            imported_count,
            source_url: source_url.to_string(),
        })
    }
}
