//! Cloudflare storage clients.
//!
//! This module wraps three Cloudflare products behind small async clients that
//! talk to the Cloudflare v4 REST API:
//!
//! * [`D1Client`] runs SQL against a D1 database.
//! * [`KvClient`] reads and writes values in a Workers KV namespace.
//! * [`R2Client`] lists, uploads, downloads and deletes R2 objects.
//!
//! [`CloudflareStorage`] bundles the three behind one handle sharing a single
//! configuration and connection pool.
//!
//! Every method performs exactly one HTTP round trip. Nothing is cached and
//! nothing is retried; failures are returned as [`CloudflareError`].
//!
//! # Examples
//!
//! ```rust,no_run
//! # use cloud_utils::cloudflare::{CloudflareConfig, CloudflareStorage};
//! # async fn run() -> Result<(), cloud_utils::cloudflare::CloudflareError> {
//! let storage = CloudflareStorage::new(CloudflareConfig::new("api-token", "account-id"))?;
//!
//! let result = storage.d1.execute_query("database-id", "SELECT 1 AS one", &[]).await?;
//! println!("{} rows", result.results.len());
//!
//! storage.kv.write_value("namespace-id", "greeting", "hello", Some(60)).await?;
//! let value = storage.kv.read_value("namespace-id", "greeting").await?;
//! assert_eq!(&value[..], b"hello");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod d1;
pub mod kv;
pub mod r2;

pub(crate) mod client;

use std::sync::Arc;

use reqwest::StatusCode;
use thiserror::Error;

use self::client::ApiClient;

pub use self::client::ApiMessage;
pub use self::config::CloudflareConfig;
pub use self::d1::{D1Client, QueryMeta, QueryResult, Row};
pub use self::kv::{KvClient, KvEntry};
pub use self::r2::{ObjectRecord, ObjectStream, R2Client};

/// Errors that can occur during Cloudflare operations.
#[derive(Error, Debug)]
pub enum CloudflareError {
    /// Wrapper for `reqwest::Error`; covers connection failures and timeouts.
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    /// Wrapper for `reqwest_middleware::Error`.
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    /// The API answered with a status outside the success set.
    #[error("unexpected status code {status}: {message}")]
    UnexpectedStatus { status: StatusCode, message: String },
    /// The response envelope was not valid JSON of the expected shape.
    #[error("error decoding response: {0}")]
    DecodeError(#[source] serde_json::Error),
    /// The envelope reported `success: false`.
    #[error("API error {code}: {message}")]
    ApiError { code: i64, message: String },
    /// The requested KV key does not exist.
    #[error("key not found: {0}")]
    NotFound(String),
    /// A D1 query returned an empty result list.
    #[error("query returned no results")]
    EmptyResult,
    /// A caller-supplied value could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    SerializationError(#[source] serde_json::Error),
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// An id or key that cannot be used as a URL path segment.
    #[error("invalid path segment: {0:?}")]
    InvalidPathSegment(String),
}

impl CloudflareError {
    /// Returns `true` when the request did not complete within the configured timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::RequestError(e) => e.is_timeout(),
            Self::MiddlewareError(reqwest_middleware::Error::Reqwest(e)) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// The HTTP status behind the error, when one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::NotFound(_) => Some(StatusCode::NOT_FOUND),
            Self::RequestError(e) => e.status(),
            _ => None,
        }
    }
}

/// Access to D1, KV and R2 through one handle.
#[derive(Clone)]
pub struct CloudflareStorage {
    /// D1 SQL database client.
    pub d1: D1Client,
    /// KV key-value storage client.
    pub kv: KvClient,
    /// R2 object storage client.
    pub r2: R2Client,
}

impl CloudflareStorage {
    pub fn new(config: CloudflareConfig) -> Result<Self, CloudflareError> {
        let api = ApiClient::new(Arc::new(config))?;

        Ok(Self {
            d1: D1Client::from_api(api.clone()),
            kv: KvClient::from_api(api.clone()),
            r2: R2Client::from_api(api),
        })
    }

    pub fn config(&self) -> &CloudflareConfig {
        self.d1.config()
    }
}
