//! Cloudflare D1 SQL database client.
//!
//! Responses follow the current D1 query schema, where the envelope `result` is
//! an array holding one entry per executed statement.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::cloudflare::client::{read_envelope, ApiClient};
use crate::cloudflare::config::CloudflareConfig;
use crate::cloudflare::CloudflareError;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// The result of a single SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub results: Vec<Row>,
    #[serde(default)]
    pub meta: QueryMeta,
}

impl QueryResult {
    /// Deserializes every row into `T`.
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, CloudflareError> {
        self.results
            .iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row.clone()))
                    .map_err(CloudflareError::SerializationError)
            })
            .collect()
    }
}

/// Execution metadata reported by D1, passed through as received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    /// Execution time in milliseconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub rows_read: u64,
    #[serde(default)]
    pub rows_written: u64,
    #[serde(default)]
    pub last_row_id: Option<i64>,
    #[serde(default)]
    pub changes: u64,
    #[serde(default)]
    pub changed_db: bool,
    #[serde(default)]
    pub size_after: Option<u64>,
    #[serde(default)]
    pub served_by: Option<String>,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    sql: &'a str,
    #[serde(skip_serializing_if = "no_params")]
    params: &'a [Value],
}

fn no_params(params: &&[Value]) -> bool {
    params.is_empty()
}

/// Client for Cloudflare D1.
#[derive(Clone)]
pub struct D1Client {
    api: ApiClient,
}

impl D1Client {
    pub fn new(config: CloudflareConfig) -> Result<Self, CloudflareError> {
        Ok(Self::from_api(ApiClient::new(Arc::new(config))?))
    }

    pub(crate) fn from_api(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn config(&self) -> &CloudflareConfig {
        self.api.config()
    }

    /// Executes `sql` with positional `params` and returns the first statement result.
    ///
    /// # Errors
    ///
    /// * [`CloudflareError::UnexpectedStatus`] for any status other than 200.
    /// * [`CloudflareError::ApiError`] when the envelope reports `success: false`.
    /// * [`CloudflareError::EmptyResult`] when D1 returns no statement results.
    pub async fn execute_query(
        &self,
        database_id: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<QueryResult, CloudflareError> {
        self.execute_batch(database_id, sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or(CloudflareError::EmptyResult)
    }

    /// Executes `sql`, which may hold several `;`-separated statements, and
    /// returns one [`QueryResult`] per statement.
    pub async fn execute_batch(
        &self,
        database_id: &str,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<QueryResult>, CloudflareError> {
        let url = self
            .api
            .account_url(&["d1", "database", database_id, "query"])?;
        debug!(database_id, params = params.len(), "executing D1 query");

        let response = self
            .api
            .client()
            .post(url)
            .json(&QueryRequest { sql, params })
            .send()
            .await?;

        let envelope = read_envelope::<Vec<QueryResult>>(response).await?;
        Ok(envelope.result.unwrap_or_default())
    }
}
