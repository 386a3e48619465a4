//! Cached public signing keys of the identity provider

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// How long a fetched key set is trusted before it is fetched again
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One public key from the provider's key set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKey {
    pub kid: String,
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    /// RSA modulus, base64url without padding
    #[serde(default)]
    pub n: String,
    /// RSA public exponent, base64url without padding
    #[serde(default)]
    pub e: String,
}

/// Wire form of the provider's key set document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySet {
    pub keys: Vec<SigningKey>,
}

/// Errors from fetching the key set
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("key set request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("key set endpoint {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("key set from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Default)]
struct CacheState {
    keys: Option<Vec<SigningKey>>,
    fetched_at: Option<Instant>,
}

impl CacheState {
    fn is_fresh(&self, max_age: Duration) -> bool {
        match (&self.keys, self.fetched_at) {
            (Some(keys), Some(at)) => !keys.is_empty() && at.elapsed() < max_age,
            _ => false,
        }
    }
}

/// Process-wide cache of the provider's signing keys
///
/// Refreshes are serialized: concurrent callers finding the cache stale
/// queue on the write lock, and only the first one fetches. A failed
/// refresh leaves the previous keys in place.
pub struct KeySetCache {
    url: String,
    client: reqwest::Client,
    max_age: Duration,
    state: RwLock<CacheState>,
}

impl KeySetCache {
    /// Create an empty cache for the key set at `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            client,
            max_age: DEFAULT_MAX_AGE,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Override how long fetched keys stay fresh
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Make sure a fresh key set is cached, fetching it if needed
    ///
    /// # Errors
    ///
    /// Returns error if a fetch was needed and failed
    pub async fn ensure_fresh(&self) -> Result<(), FetchError> {
        if self.state.read().await.is_fresh(self.max_age) {
            return Ok(());
        }

        let mut state = self.state.write().await;
        // Another caller may have refreshed while we waited for the lock
        if state.is_fresh(self.max_age) {
            return Ok(());
        }

        let keys = self.fetch().await?;
        tracing::info!(url = %self.url, keys = keys.len(), "refreshed signing keys");

        state.keys = Some(keys);
        state.fetched_at = Some(Instant::now());
        Ok(())
    }

    /// Look up a cached key by its `kid`
    pub async fn find_key(&self, kid: &str) -> Option<SigningKey> {
        let state = self.state.read().await;
        state
            .keys
            .as_ref()?
            .iter()
            .find(|key| key.kid == kid)
            .cloned()
    }

    /// Number of cached keys
    pub async fn len(&self) -> usize {
        self.state.read().await.keys.as_ref().map_or(0, Vec::len)
    }

    /// Whether no keys are cached
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// When the cached keys were fetched, if ever
    pub async fn last_fetched(&self) -> Option<Instant> {
        self.state.read().await.fetched_at
    }

    async fn fetch(&self) -> Result<Vec<SigningKey>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = %status, "key set fetch rejected");
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let set: KeySet = response.json().await.map_err(|source| FetchError::Decode {
            url: self.url.clone(),
            source,
        })?;

        Ok(set.keys)
    }
}
