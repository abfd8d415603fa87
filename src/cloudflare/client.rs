use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cloudflare::config::CloudflareConfig;
use crate::cloudflare::CloudflareError;
use crate::core::middleware::BearerTokenMiddleware;

/// A single entry of the `errors` or `messages` list of a Cloudflare envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// The JSON envelope wrapped around every Cloudflare v4 API response.
#[derive(Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    fn into_api_error(self) -> CloudflareError {
        match self.errors.into_iter().next() {
            Some(error) => CloudflareError::ApiError {
                code: error.code,
                message: error.message,
            },
            None => CloudflareError::ApiError {
                code: 0,
                message: "request was not successful".to_string(),
            },
        }
    }
}

/// HTTP plumbing shared by the D1, KV and R2 clients.
///
/// Holds the authenticated client and the configuration; no per-call state.
#[derive(Clone)]
pub(crate) struct ApiClient {
    client: ClientWithMiddleware,
    config: Arc<CloudflareConfig>,
}

impl ApiClient {
    pub(crate) fn new(config: Arc<CloudflareConfig>) -> Result<Self, CloudflareError> {
        let http = Client::builder().timeout(config.timeout()).build()?;
        let bearer = BearerTokenMiddleware::new(config.api_token())
            .map_err(|e| CloudflareError::InvalidHeader(format!("API token: {}", e)))?;

        let client = ClientBuilder::new(http).with(bearer).build();

        Ok(Self { client, config })
    }

    pub(crate) fn client(&self) -> &ClientWithMiddleware {
        &self.client
    }

    pub(crate) fn config(&self) -> &CloudflareConfig {
        &self.config
    }

    /// Builds `{base_url}/accounts/{account_id}/{segments...}`, escaping every
    /// segment on its own so keys containing `/`, `?` or `%` stay intact.
    ///
    /// Empty, `.` and `..` segments are rejected: the URL parser would drop or
    /// resolve them and the request would reach a different endpoint.
    pub(crate) fn account_url(&self, segments: &[&str]) -> Result<Url, CloudflareError> {
        let account_id = self.config.account_id();
        for segment in std::iter::once(&account_id).chain(segments) {
            if matches!(*segment, "" | "." | "..") {
                return Err(CloudflareError::InvalidPathSegment(segment.to_string()));
            }
        }

        let base_url = self.config.base_url();
        let mut url = Url::parse(base_url)?;
        url.path_segments_mut()
            .map_err(|_| CloudflareError::InvalidBaseUrl(base_url.to_string()))?
            .pop_if_empty()
            .push("accounts")
            .push(account_id)
            .extend(segments);
        Ok(url)
    }
}

/// Requires HTTP 200 and `success: true`, then hands back the decoded envelope.
pub(crate) async fn read_envelope<T: DeserializeOwned>(
    response: Response,
) -> Result<Envelope<T>, CloudflareError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status != StatusCode::OK {
        return Err(unexpected_status(status, &body));
    }

    let envelope: Envelope<T> =
        serde_json::from_slice(&body).map_err(CloudflareError::DecodeError)?;

    if !envelope.success {
        return Err(envelope.into_api_error());
    }

    Ok(envelope)
}

/// Like [`read_envelope`] for calls whose `result` carries nothing useful.
pub(crate) async fn expect_success(response: Response) -> Result<(), CloudflareError> {
    read_envelope::<IgnoredAny>(response).await.map(|_| ())
}

/// Describes a non-success status, preferring the first error reported in the
/// envelope and falling back to the raw body.
pub(crate) fn unexpected_status(status: StatusCode, body: &[u8]) -> CloudflareError {
    let message = serde_json::from_slice::<Envelope<IgnoredAny>>(body)
        .ok()
        .and_then(|envelope| envelope.errors.into_iter().next())
        .map(|error| error.message)
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    CloudflareError::UnexpectedStatus { status, message }
}
