//! Inbound request authentication.
//!
//! Two equivalent ways to guard routes with a Firebase ID token:
//!
//! * [`FirebaseAuthLayer`], a tower [`Layer`] usable with any tower stack.
//! * [`require_auth`], an axum function middleware for
//!   [`axum::middleware::from_fn_with_state`].
//!
//! Both read `Authorization: Bearer {token}`, verify the token and, only on
//! success, call the wrapped service with an [`AuthContext`] stored in the
//! request extensions. Failures are answered with 401 and never reach it.
//!
//! ```rust,no_run
//! # use axum::{routing::get, Router};
//! # use cloud_utils::auth::{AuthenticatedUser, FirebaseAuth, FirebaseAuthLayer};
//! # fn app(auth: FirebaseAuth) -> Router {
//! async fn me(AuthenticatedUser(ctx): AuthenticatedUser) -> String {
//!     ctx.uid
//! }
//!
//! Router::new()
//!     .route("/me", get(me))
//!     .layer(FirebaseAuthLayer::new(auth))
//! # }
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{header, Extensions, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::auth::verifier::{FirebaseToken, TokenVerificationError, TokenVerifier};
use crate::auth::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// The verified identity attached to an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: String,
    pub token: Arc<FirebaseToken>,
}

/// Returns the token of an `Authorization: Bearer {token}` header.
///
/// The scheme is matched literally, so `bearer x` and `Token x` are rejected.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AuthError::MissingOrMalformedHeader("authorization header is required".to_string())
        })?;

    value.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        AuthError::MissingOrMalformedHeader(
            "authorization header must be in the format 'Bearer {token}'".to_string(),
        )
    })
}

/// UID stored by the auth middleware.
pub fn uid_from_extensions(extensions: &Extensions) -> Result<&str, AuthError> {
    extensions
        .get::<AuthContext>()
        .map(|ctx| ctx.uid.as_str())
        .ok_or(AuthError::ContextMissing("uid"))
}

/// Verified token stored by the auth middleware.
pub fn token_from_extensions(extensions: &Extensions) -> Result<&FirebaseToken, AuthError> {
    extensions
        .get::<AuthContext>()
        .map(|ctx| ctx.token.as_ref())
        .ok_or(AuthError::ContextMissing("token"))
}

/// Extracts and verifies the bearer token of a request.
pub async fn authenticate<V>(verifier: &V, headers: &HeaderMap) -> Result<AuthContext, AuthError>
where
    V: TokenVerifier + ?Sized,
{
    let id_token = extract_bearer_token(headers)?;

    let token = verifier.verify(id_token).await.map_err(|e| match e {
        AuthError::VerificationFailed(_) => e,
        other => AuthError::VerificationFailed(TokenVerificationError::InvalidToken(other.to_string())),
    })?;

    Ok(AuthContext {
        uid: token.uid().to_string(),
        token: Arc::new(token),
    })
}

fn reject(err: AuthError) -> Response {
    warn!(error = %err, "rejecting unauthenticated request");
    err.into_response()
}

/// Tower layer that authenticates every request with a [`TokenVerifier`].
pub struct FirebaseAuthLayer<V> {
    verifier: Arc<V>,
}

impl<V: TokenVerifier> FirebaseAuthLayer<V> {
    pub fn new(verifier: V) -> Self {
        Self::from_arc(Arc::new(verifier))
    }

    pub fn from_arc(verifier: Arc<V>) -> Self {
        Self { verifier }
    }
}

impl<V> Clone for FirebaseAuthLayer<V> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<S, V: TokenVerifier> Layer<S> for FirebaseAuthLayer<V> {
    type Service = FirebaseAuthService<S, V>;

    fn layer(&self, inner: S) -> Self::Service {
        FirebaseAuthService {
            inner,
            verifier: Arc::clone(&self.verifier),
        }
    }
}

/// Service produced by [`FirebaseAuthLayer`].
pub struct FirebaseAuthService<S, V> {
    inner: S,
    verifier: Arc<V>,
}

impl<S: Clone, V> Clone for FirebaseAuthService<S, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<S, V, B> Service<axum::http::Request<B>> for FirebaseAuthService<S, V>
where
    S: Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    V: TokenVerifier,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: axum::http::Request<B>) -> Self::Future {
        let verifier = Arc::clone(&self.verifier);
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let authenticated = authenticate(&*verifier, req.headers()).await;
            match authenticated {
                Ok(ctx) => {
                    debug!(uid = %ctx.uid, "authenticated request");
                    req.extensions_mut().insert(ctx);
                    inner.call(req).await
                }
                Err(err) => Ok(reject(err)),
            }
        })
    }
}

/// Axum middleware with the same behaviour as [`FirebaseAuthLayer`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use axum::{middleware, routing::get, Router};
/// # use cloud_utils::auth::{require_auth, FirebaseAuth};
/// # fn app(auth: Arc<FirebaseAuth>) -> Router {
/// Router::new()
///     .route("/protected", get(|| async { "ok" }))
///     .route_layer(middleware::from_fn_with_state(auth, require_auth::<FirebaseAuth>))
/// # }
/// ```
pub async fn require_auth<V: TokenVerifier>(
    State(verifier): State<Arc<V>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authenticated = authenticate(&*verifier, request.headers()).await;
    match authenticated {
        Ok(ctx) => {
            debug!(uid = %ctx.uid, "authenticated request");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(err) => reject(err),
    }
}

/// Extractor for handlers behind the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthContext);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthenticatedUser)
            .ok_or(AuthError::ContextMissing("auth context"))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::MissingOrMalformedHeader(_) | AuthError::ContextMissing(_) => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            AuthError::VerificationFailed(_) => {
                (StatusCode::UNAUTHORIZED, format!("Invalid token: {}", self)).into_response()
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response(),
        }
    }
}

#[cfg(test)]
mod tests;
