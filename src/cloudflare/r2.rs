use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cloudflare::client::{read_envelope, unexpected_status, ApiClient};
use crate::cloudflare::config::CloudflareConfig;
use crate::cloudflare::CloudflareError;

/// Prefix of the headers carrying user metadata. Header names are
/// case-insensitive and `http` stores them lowercase.
pub const METADATA_HEADER_PREFIX: &str = "x-metadata-";

/// An object stored in an R2 bucket, as reported at the time of the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A downloaded object whose body has not been read yet.
///
/// The value owns the live HTTP response. Dropping it, on any path, releases
/// the underlying connection.
#[derive(Debug)]
pub struct ObjectStream {
    response: Response,
    metadata: HashMap<String, String>,
}

impl ObjectStream {
    /// User metadata with the `X-Metadata-` prefix stripped.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    pub fn content_type(&self) -> Option<&str> {
        self.response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    /// Reads the next chunk of the body, or `None` once it is exhausted.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, CloudflareError> {
        Ok(self.response.chunk().await?)
    }

    /// Buffers the remaining body in memory.
    pub async fn bytes(self) -> Result<Bytes, CloudflareError> {
        Ok(self.response.bytes().await?)
    }

    /// Converts the body into a stream of chunks.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
        self.response.bytes_stream()
    }

    pub fn into_parts(self) -> (Response, HashMap<String, String>) {
        (self.response, self.metadata)
    }
}

/// Collects the `X-Metadata-*` headers into a map keyed by the suffix. When a
/// header repeats, the first value wins.
pub fn extract_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .keys()
        .filter_map(|name| {
            let key = name.as_str().strip_prefix(METADATA_HEADER_PREFIX)?;
            let value = headers.get(name)?.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Client for Cloudflare R2 object storage.
#[derive(Clone)]
pub struct R2Client {
    api: ApiClient,
}

impl R2Client {
    pub fn new(config: CloudflareConfig) -> Result<Self, CloudflareError> {
        Ok(Self::from_api(ApiClient::new(Arc::new(config))?))
    }

    pub(crate) fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn config(&self) -> &CloudflareConfig {
        self.api.config()
    }

    /// Lists the objects of a bucket, optionally restricted to `prefix`.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<ObjectRecord>, CloudflareError> {
        let url = self.api.account_url(&["r2", "buckets", bucket, "objects"])?;

        let mut request = self.api.client().get(url);
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            request = request.query(&[("prefix", prefix)]);
        }

        let envelope = read_envelope::<Vec<ObjectRecord>>(request.send().await?).await?;
        Ok(envelope.result.unwrap_or_default())
    }

    /// Uploads `body` under `key`.
    ///
    /// The body is streamed as given; wrap a stream with `reqwest::Body::wrap_stream`
    /// to avoid buffering large payloads. Each metadata entry is sent as its own
    /// `X-Metadata-{name}` header; names that differ only in case are rejected
    /// with [`CloudflareError::InvalidHeader`]. `Content-Type` is omitted when
    /// `content_type` is empty.
    pub async fn upload_object(
        &self,
        bucket: &str,
        key: &str,
        body: impl Into<reqwest::Body>,
        content_type: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<ObjectRecord, CloudflareError> {
        let url = self.object_url(bucket, key)?;

        let mut headers = HeaderMap::new();
        if !content_type.is_empty() {
            let value = HeaderValue::from_str(content_type)
                .map_err(|_| CloudflareError::InvalidHeader(format!("content type {:?}", content_type)))?;
            headers.insert(header::CONTENT_TYPE, value);
        }
        for (name, value) in metadata {
            let header_name = HeaderName::from_bytes(format!("{}{}", METADATA_HEADER_PREFIX, name).as_bytes())
                .map_err(|_| CloudflareError::InvalidHeader(format!("metadata name {:?}", name)))?;
            if headers.contains_key(&header_name) {
                return Err(CloudflareError::InvalidHeader(format!(
                    "metadata name {:?} collides with another name once lowercased",
                    name
                )));
            }
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| CloudflareError::InvalidHeader(format!("metadata value for {:?}", name)))?;
            headers.insert(header_name, header_value);
        }
        debug!(bucket, key, metadata = metadata.len(), "uploading R2 object");

        let response = self
            .api
            .client()
            .put(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let envelope = read_envelope::<ObjectRecord>(response).await?;
        envelope.result.ok_or_else(|| CloudflareError::ApiError {
            code: 0,
            message: "upload response did not include the object".to_string(),
        })
    }

    /// Starts downloading `key`. The returned [`ObjectStream`] holds the open
    /// response; the caller decides how to consume the body.
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, CloudflareError> {
        let url = self.object_url(bucket, key)?;

        let response = self.api.client().get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.bytes().await?;
            return Err(unexpected_status(status, &body));
        }

        let metadata = extract_metadata(response.headers());
        Ok(ObjectStream { response, metadata })
    }

    /// Deletes `key`. Only HTTP 200 counts as success, so deleting a missing
    /// object surfaces as [`CloudflareError::UnexpectedStatus`] with 404.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), CloudflareError> {
        let url = self.object_url(bucket, key)?;
        debug!(bucket, key, "deleting R2 object");

        let response = self.api.client().delete(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.bytes().await?;
            return Err(unexpected_status(status, &body));
        }

        Ok(())
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<url::Url, CloudflareError> {
        self.api
            .account_url(&["r2", "buckets", bucket, "objects", key])
    }
}
