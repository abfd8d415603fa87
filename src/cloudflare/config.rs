use std::fmt;
use std::time::Duration;

/// Default endpoint of the Cloudflare v4 REST API.
pub const CLOUDFLARE_V4_API: &str = "https://api.cloudflare.com/client/v4";

/// Default timeout applied to every Cloudflare request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials and endpoint information for Cloudflare services.
///
/// The configuration is immutable once built and is shared by the D1, KV and R2
/// clients. Nothing here is read from the environment; callers decide where the
/// token and account ID come from.
///
/// ```rust
/// # use cloud_utils::cloudflare::CloudflareConfig;
/// # use std::time::Duration;
/// let config = CloudflareConfig::new("api-token", "account-id")
///     .with_timeout(Duration::from_secs(10));
/// assert_eq!(config.account_id(), "account-id");
/// ```
#[derive(Clone)]
pub struct CloudflareConfig {
    api_token: String,
    account_id: String,
    base_url: String,
    timeout: Duration,
}

impl CloudflareConfig {
    pub fn new(api_token: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            account_id: account_id.into(),
            base_url: CLOUDFLARE_V4_API.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the API endpoint. An empty string restores the default.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = if base_url.is_empty() {
            CLOUDFLARE_V4_API.to_string()
        } else {
            base_url
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
