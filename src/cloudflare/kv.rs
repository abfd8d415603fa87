use std::sync::Arc;

use bytes::Bytes;
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cloudflare::client::{expect_success, read_envelope, unexpected_status, ApiClient};
use crate::cloudflare::config::CloudflareConfig;
use crate::cloudflare::CloudflareError;

/// A key listed from a KV namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvEntry {
    pub name: String,
    /// Expiration as a Unix timestamp in seconds, if the key expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Client for Cloudflare Workers KV.
#[derive(Clone)]
pub struct KvClient {
    api: ApiClient,
}

impl KvClient {
    pub fn new(config: CloudflareConfig) -> Result<Self, CloudflareError> {
        Ok(Self::from_api(ApiClient::new(Arc::new(config))?))
    }

    pub(crate) fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn config(&self) -> &CloudflareConfig {
        self.api.config()
    }

    /// Lists the keys of a namespace, optionally restricted to `prefix`.
    pub async fn list_keys(
        &self,
        namespace_id: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<KvEntry>, CloudflareError> {
        let url = self
            .api
            .account_url(&["storage", "kv", "namespaces", namespace_id, "keys"])?;

        let mut request = self.api.client().get(url);
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            request = request.query(&[("prefix", prefix)]);
        }

        let envelope = read_envelope::<Vec<KvEntry>>(request.send().await?).await?;
        Ok(envelope.result.unwrap_or_default())
    }

    /// Stores raw bytes under `key`. `expiration_ttl` is in seconds; `None`
    /// stores the value without expiry.
    pub async fn write_value(
        &self,
        namespace_id: &str,
        key: &str,
        value: impl Into<reqwest::Body>,
        expiration_ttl: Option<u64>,
    ) -> Result<(), CloudflareError> {
        let url = self.value_url(namespace_id, key)?;
        debug!(namespace_id, key, ?expiration_ttl, "writing KV value");

        let mut request = self
            .api
            .client()
            .put(url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(value);
        if let Some(ttl) = expiration_ttl {
            request = request.query(&[("expiration_ttl", ttl)]);
        }

        expect_success(request.send().await?).await
    }

    /// Reads the raw bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CloudflareError::NotFound`] when the key does not exist, so a
    /// missing key can be told apart from every other failure.
    pub async fn read_value(&self, namespace_id: &str, key: &str) -> Result<Bytes, CloudflareError> {
        let url = self.value_url(namespace_id, key)?;

        let response = self.api.client().get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CloudflareError::NotFound(key.to_string()));
        }
        if status != StatusCode::OK {
            let body = response.bytes().await?;
            return Err(unexpected_status(status, &body));
        }

        Ok(response.bytes().await?)
    }

    pub async fn delete_value(&self, namespace_id: &str, key: &str) -> Result<(), CloudflareError> {
        let url = self.value_url(namespace_id, key)?;
        debug!(namespace_id, key, "deleting KV value");

        let response = self.api.client().delete(url).send().await?;
        expect_success(response).await
    }

    /// Serializes `value` to JSON and stores it under `key`.
    pub async fn write_json<T: Serialize + ?Sized>(
        &self,
        namespace_id: &str,
        key: &str,
        value: &T,
        expiration_ttl: Option<u64>,
    ) -> Result<(), CloudflareError> {
        let body = serde_json::to_vec(value).map_err(CloudflareError::SerializationError)?;
        self.write_value(namespace_id, key, body, expiration_ttl)
            .await
    }

    /// Reads the value under `key` and deserializes it from JSON.
    pub async fn read_json<T: DeserializeOwned>(
        &self,
        namespace_id: &str,
        key: &str,
    ) -> Result<T, CloudflareError> {
        let data = self.read_value(namespace_id, key).await?;
        serde_json::from_slice(&data).map_err(CloudflareError::SerializationError)
    }

    fn value_url(&self, namespace_id: &str, key: &str) -> Result<url::Url, CloudflareError> {
        self.api
            .account_url(&["storage", "kv", "namespaces", namespace_id, "values", key])
    }
}
