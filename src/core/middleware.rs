use http::Extensions;
use reqwest::header::{self, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

#[cfg(feature = "firebase")]
pub use self::google::AuthMiddleware;

/// Attaches a static `Authorization: Bearer {token}` header to every request.
///
/// Used for APIs authenticated with a long-lived API token, such as Cloudflare's.
#[derive(Clone)]
pub struct BearerTokenMiddleware {
    header: HeaderValue,
}

impl BearerTokenMiddleware {
    pub fn new(token: &str) -> Result<Self, header::InvalidHeaderValue> {
        let mut header = HeaderValue::from_str(&format!("Bearer {}", token))?;
        header.set_sensitive(true);
        Ok(Self { header })
    }
}

#[async_trait::async_trait]
impl Middleware for BearerTokenMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        req.headers_mut()
            .insert(header::AUTHORIZATION, self.header.clone());

        next.run(req, extensions).await
    }
}

#[cfg(feature = "firebase")]
mod google {
    use std::sync::Arc;

    use http::Extensions;
    use reqwest::header::{self, HeaderValue};
    use reqwest::{Request, Response};
    use reqwest_middleware::{Middleware, Next};
    use tokio::sync::OnceCell;
    use yup_oauth2::authenticator::DefaultAuthenticator;
    use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

    const GOOGLE_SCOPES: &[&str] = &[
        "https://www.googleapis.com/auth/cloud-platform",
        "https://www.googleapis.com/auth/firebase",
        "https://www.googleapis.com/auth/identitytoolkit",
        "https://www.googleapis.com/auth/userinfo.email",
    ];

    /// Authenticates outbound Google API calls with an OAuth2 access token minted
    /// from a service account key.
    ///
    /// The authenticator is built lazily on first use and shared between clones.
    #[derive(Clone)]
    pub struct AuthMiddleware {
        pub key: ServiceAccountKey,
        authenticator: Arc<OnceCell<DefaultAuthenticator>>,
    }

    impl AuthMiddleware {
        pub fn new(key: ServiceAccountKey) -> Self {
            Self {
                key,
                authenticator: Arc::new(OnceCell::new()),
            }
        }

        async fn get_token(&self) -> Result<String, anyhow::Error> {
            let auth = self
                .authenticator
                .get_or_try_init(|| async {
                    ServiceAccountAuthenticator::builder(self.key.clone())
                        .build()
                        .await
                })
                .await?;

            let token = auth.token(GOOGLE_SCOPES).await?;

            Ok(token
                .token()
                .ok_or_else(|| anyhow::anyhow!("No token found"))?
                .to_string())
        }
    }

    #[async_trait::async_trait]
    impl Middleware for AuthMiddleware {
        async fn handle(
            &self,
            mut req: Request,
            extensions: &mut Extensions,
            next: Next<'_>,
        ) -> reqwest_middleware::Result<Response> {
            let token = self.get_token().await.map_err(|e| {
                reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                    "Failed to get auth token: {}",
                    e
                ))
            })?;

            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                reqwest_middleware::Error::Middleware(anyhow::anyhow!(
                    "Invalid auth token: {}",
                    e
                ))
            })?;
            req.headers_mut().insert(header::AUTHORIZATION, value);

            next.run(req, extensions).await
        }
    }
}
