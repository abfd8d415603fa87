pub mod keys;
pub mod middleware;
pub mod models;
pub mod token;
pub mod user;
pub mod verifier;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::auth::models::{
    AccountIdResponse, CreateUserRequest, DeleteAccountRequest, GetAccountInfoRequest,
    GetAccountInfoResponse, ListUsersResponse, UpdateUserRequest, UserRecord,
};
use crate::auth::token::{check_reserved_claims, CustomTokenSigner};
use crate::auth::verifier::{FirebaseToken, IdTokenVerifier, TokenVerificationError, TokenVerifier};
use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;

pub use self::middleware::{
    extract_bearer_token, require_auth, token_from_extensions, uid_from_extensions, AuthContext,
    AuthenticatedUser, FirebaseAuthLayer, FirebaseAuthService,
};
pub use self::user::BaseUser;


const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1/projects";

const MAX_CLAIMS_PAYLOAD_SIZE: usize = 1000;
const MAX_LIST_USERS_RESULTS: u32 = 1000;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("{0}")]
    MissingOrMalformedHeader(String),
    #[error("error verifying ID token: {0}")]
    VerificationFailed(#[from] TokenVerificationError),
    #[error("unauthorized: {0} not found in context")]
    ContextMissing(&'static str),
    #[error("error creating custom token: {0}")]
    TokenSigning(#[source] jsonwebtoken::errors::Error),
    #[error("invalid credentials: {0}")]
    Credentials(String),
    #[error("service account key has no project_id")]
    ProjectIdMissing,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AuthError {
    /// Maps an Identity Toolkit error message to the matching variant.
    fn from_api_message(message: String) -> Self {
        if message.starts_with("USER_NOT_FOUND") {
            AuthError::UserNotFound
        } else {
            AuthError::ApiError(message)
        }
    }
}

/// Firebase Authentication backed by the Identity Toolkit REST API.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: ClientWithMiddleware,
    base_url: String,
    verifier: Arc<IdTokenVerifier>,
    signer: Option<Arc<CustomTokenSigner>>,
}

impl FirebaseAuth {
    /// Creates a client authenticated as the middleware's service account.
    pub fn new(middleware: AuthMiddleware) -> Result<Self, AuthError> {
        let project_id = middleware
            .key
            .project_id
            .clone()
            .ok_or(AuthError::ProjectIdMissing)?;
        let signer = CustomTokenSigner::from_service_account(&middleware.key)?;

        let client = ClientBuilder::new(Client::new()).with(middleware).build();

        Ok(Self {
            client,
            base_url: format!("{}/{}", IDENTITY_TOOLKIT_URL, project_id),
            verifier: Arc::new(IdTokenVerifier::new(project_id)),
            signer: Some(Arc::new(signer)),
        })
    }

    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        base_url: String,
        verifier: IdTokenVerifier,
    ) -> Self {
        Self {
            client,
            base_url,
            verifier: Arc::new(verifier),
            signer: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_signer(mut self, signer: CustomTokenSigner) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    pub fn project_id(&self) -> &str {
        self.verifier.project_id()
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        default_msg: &str,
    ) -> Result<Response, AuthError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "calling Identity Toolkit");

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, default_msg).await;
            return Err(AuthError::from_api_message(message));
        }

        Ok(response)
    }

    /// Creates a user and returns its UID.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<String, AuthError> {
        let response = self.post("accounts", &request, "Create user failed").await?;
        let created: AccountIdResponse = response.json().await?;
        Ok(created.local_id)
    }

    pub async fn update_user(&self, request: UpdateUserRequest) -> Result<(), AuthError> {
        self.post("accounts:update", &request, "Update user failed")
            .await?;
        Ok(())
    }

    pub async fn delete_user(&self, uid: &str) -> Result<(), AuthError> {
        let request = DeleteAccountRequest {
            local_id: uid.to_string(),
        };
        self.post("accounts:delete", &request, "Delete user failed")
            .await?;
        Ok(())
    }

    async fn get_account_info(&self, request: GetAccountInfoRequest) -> Result<UserRecord, AuthError> {
        let response = self
            .post("accounts:lookup", &request, "Get user failed")
            .await?;

        let result: GetAccountInfoResponse = response.json().await?;

        result
            .users
            .and_then(|mut users| users.pop())
            .ok_or(AuthError::UserNotFound)
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            local_id: Some(vec![uid.to_string()]),
            ..Default::default()
        })
        .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            email: Some(vec![email.to_string()]),
            ..Default::default()
        })
        .await
    }

    pub async fn get_user_by_phone_number(&self, phone: &str) -> Result<UserRecord, AuthError> {
        self.get_account_info(GetAccountInfoRequest {
            phone_number: Some(vec![phone.to_string()]),
            ..Default::default()
        })
        .await
    }

    /// Lists one page of users. Pass the previous page's `next_page_token`
    /// to continue.
    pub async fn list_users(
        &self,
        max_results: u32,
        page_token: Option<&str>,
    ) -> Result<ListUsersResponse, AuthError> {
        if max_results == 0 || max_results > MAX_LIST_USERS_RESULTS {
            return Err(AuthError::InvalidArgument(format!(
                "max_results must be between 1 and {}",
                MAX_LIST_USERS_RESULTS
            )));
        }

        let url = format!("{}/accounts:batchGet", self.base_url);

        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(token) = page_token {
            params.push(("nextPageToken", token.to_string()));
        }

        let response = self.client.get(&url).query(&params).send().await?;

        if !response.status().is_success() {
            let message = parse_error_response(response, "List users failed").await;
            return Err(AuthError::from_api_message(message));
        }

        Ok(response.json().await?)
    }

    /// Replaces the custom claims of a user. `None` or an empty map removes them.
    pub async fn set_custom_user_claims(
        &self,
        uid: &str,
        claims: Option<&Map<String, Value>>,
    ) -> Result<(), AuthError> {
        let payload = match claims.filter(|c| !c.is_empty()) {
            Some(claims) => {
                check_reserved_claims(claims)?;
                serde_json::to_string(claims)?
            }
            None => "{}".to_string(),
        };
        if payload.len() > MAX_CLAIMS_PAYLOAD_SIZE {
            return Err(AuthError::InvalidArgument(format!(
                "custom claims payload must not exceed {} characters",
                MAX_CLAIMS_PAYLOAD_SIZE
            )));
        }

        self.update_user(UpdateUserRequest {
            local_id: uid.to_string(),
            custom_attributes: Some(payload),
            ..Default::default()
        })
        .await
    }

    /// Invalidates every refresh token issued to `uid` before now.
    pub async fn revoke_refresh_tokens(&self, uid: &str) -> Result<(), AuthError> {
        self.update_user(UpdateUserRequest {
            local_id: uid.to_string(),
            valid_since: Some(Utc::now().timestamp().to_string()),
            ..Default::default()
        })
        .await
    }

    /// Signs a custom token for `uid`, embedding `claims` when non-empty.
    pub fn create_custom_token(
        &self,
        uid: &str,
        claims: Option<&Map<String, Value>>,
    ) -> Result<String, AuthError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            AuthError::Credentials("no service account key available for signing".to_string())
        })?;
        signer.sign(uid, claims)
    }

    /// Verifies a Firebase ID token and returns its claims.
    pub async fn verify_id_token(&self, id_token: &str) -> Result<FirebaseToken, AuthError> {
        Ok(self.verifier.verify_token(id_token).await?)
    }
}

#[async_trait]
impl TokenVerifier for FirebaseAuth {
    async fn verify(&self, id_token: &str) -> Result<FirebaseToken, AuthError> {
        self.verify_id_token(id_token).await
    }
}
