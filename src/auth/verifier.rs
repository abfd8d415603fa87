use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::keys::{KeyFetchError, PublicKeyManager};
use crate::auth::AuthError;

/// Allowed clock skew, in seconds, when checking `auth_time`.
const AUTH_TIME_LEEWAY: u64 = 300;

#[derive(Error, Debug)]
pub enum TokenVerificationError {
    #[error("id token is empty")]
    EmptyToken,
    #[error("Key fetch error: {0}")]
    KeyFetchError(#[from] KeyFetchError),
    #[error("JWT validation error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// The verified claims of a Firebase ID token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirebaseToken {
    pub aud: String,
    pub iss: String,
    pub sub: String,
    pub exp: u64,
    pub iat: u64,
    #[serde(default)]
    pub auth_time: u64,
    #[serde(default)]
    pub user_id: String,
    /// Every other claim, custom claims included.
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl FirebaseToken {
    /// The UID of the signed-in user.
    pub fn uid(&self) -> &str {
        &self.sub
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Verifies an ID token and returns its claims.
///
/// Implemented by [`FirebaseAuth`](crate::auth::FirebaseAuth) and
/// [`IdTokenVerifier`]; the inbound middleware accepts any implementation.
#[async_trait]
pub trait TokenVerifier: Send + Sync + 'static {
    async fn verify(&self, id_token: &str) -> Result<FirebaseToken, AuthError>;
}

#[async_trait]
impl<V: TokenVerifier + ?Sized> TokenVerifier for Arc<V> {
    async fn verify(&self, id_token: &str) -> Result<FirebaseToken, AuthError> {
        (**self).verify(id_token).await
    }
}

/// Checks ID tokens against Google's published signing keys.
pub struct IdTokenVerifier {
    project_id: String,
    key_manager: PublicKeyManager,
}

impl IdTokenVerifier {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            key_manager: PublicKeyManager::new(),
        }
    }

    /// Same as [`IdTokenVerifier::new`] but fetches the signing keys from `key_url`.
    pub fn with_key_url(project_id: impl Into<String>, key_url: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            key_manager: PublicKeyManager::with_url(key_url),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn verify_token(&self, token: &str) -> Result<FirebaseToken, TokenVerificationError> {
        if token.is_empty() {
            return Err(TokenVerificationError::EmptyToken);
        }

        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenVerificationError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| TokenVerificationError::InvalidToken("Missing kid in header".to_string()))?;

        let public_key_pem = self.key_manager.get_key(&kid).await?;
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!("https://securetoken.google.com/{}", self.project_id)]);

        let claims = decode::<FirebaseToken>(token, &key, &validation)?.claims;

        if claims.sub.is_empty() {
            return Err(TokenVerificationError::InvalidToken(
                "Subject (sub) claim must not be empty".to_string(),
            ));
        }
        if claims.sub.len() > 128 {
            return Err(TokenVerificationError::InvalidToken(
                "Subject (sub) claim must not exceed 128 characters".to_string(),
            ));
        }

        let now = Utc::now().timestamp().max(0) as u64;
        if claims.auth_time > now + AUTH_TIME_LEEWAY {
            return Err(TokenVerificationError::InvalidToken(
                "Auth time is in the future".to_string(),
            ));
        }

        Ok(claims)
    }
}

#[async_trait]
impl TokenVerifier for IdTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<FirebaseToken, AuthError> {
        Ok(self.verify_token(id_token).await?)
    }
}
