use std::path::Path;

use tracing::debug;
use yup_oauth2::ServiceAccountKey;

use crate::auth::{AuthError, FirebaseAuth};
use crate::core::middleware::AuthMiddleware;

/// Entry point holding the service account credentials.
#[derive(Clone)]
pub struct FirebaseApp {
    key: ServiceAccountKey,
}

impl FirebaseApp {
    pub fn new(service_account_key: ServiceAccountKey) -> Self {
        Self {
            key: service_account_key,
        }
    }

    /// Loads a service account key from a JSON file on disk.
    pub async fn from_service_account_file(path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading service account key");
        let key = yup_oauth2::read_service_account_key(path)
            .await
            .map_err(|e| AuthError::Credentials(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(key))
    }

    /// Parses a service account key from JSON bytes.
    pub fn from_service_account_json(json: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let key = yup_oauth2::parse_service_account_key(json)
            .map_err(|e| AuthError::Credentials(e.to_string()))?;
        Ok(Self::new(key))
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    pub fn auth(&self) -> Result<FirebaseAuth, AuthError> {
        FirebaseAuth::new(AuthMiddleware::new(self.key.clone()))
    }
}

#[cfg(test)]
mod tests;
