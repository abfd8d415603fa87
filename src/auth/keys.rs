use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// X.509 certificates used to sign Firebase ID tokens, keyed by `kid`.
pub const GOOGLE_PUBLIC_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

#[derive(Error, Debug)]
pub enum KeyFetchError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Unexpected status fetching public keys: {0}")]
    UnexpectedStatus(reqwest::StatusCode),
    #[error("No public key found for kid {0}")]
    KeyNotFound(String),
}

struct CachedKeys {
    keys: HashMap<String, String>,
    expires_at: Instant,
}

/// Fetches Google's token signing certificates and keeps them until the
/// `max-age` advertised by the response runs out.
pub struct PublicKeyManager {
    client: Client,
    url: String,
    cache: RwLock<Option<CachedKeys>>,
}

impl Default for PublicKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicKeyManager {
    pub fn new() -> Self {
        Self::with_url(GOOGLE_PUBLIC_KEYS_URL)
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            cache: RwLock::new(None),
        }
    }

    /// Returns the PEM certificate for `kid`, refreshing the set once when the
    /// cache is stale or does not know the key.
    pub async fn get_key(&self, kid: &str) -> Result<String, KeyFetchError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = &*cache {
                if Instant::now() < cached.expires_at {
                    if let Some(key) = cached.keys.get(kid) {
                        return Ok(key.clone());
                    }
                }
            }
        }

        let keys = self.refresh_keys().await?;
        keys.get(kid)
            .cloned()
            .ok_or_else(|| KeyFetchError::KeyNotFound(kid.to_string()))
    }

    async fn refresh_keys(&self) -> Result<HashMap<String, String>, KeyFetchError> {
        debug!(url = %self.url, "fetching token signing certificates");
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(KeyFetchError::UnexpectedStatus(response.status()));
        }

        let max_age = response
            .headers()
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_MAX_AGE);

        let keys: HashMap<String, String> = response.json().await?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys: keys.clone(),
            expires_at: Instant::now() + max_age,
        });

        Ok(keys)
    }
}

fn parse_max_age(cache_control: &str) -> Option<Duration> {
    cache_control.split(',').find_map(|part| {
        part.trim()
            .strip_prefix("max-age=")
            .and_then(|secs| secs.parse::<u64>().ok())
            .map(Duration::from_secs)
    })
}
