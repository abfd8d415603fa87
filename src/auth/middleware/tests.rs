use super::*;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::routing::get;
use axum::{middleware, Router};
use serde_json::Map;
use tower::ServiceExt;

struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, id_token: &str) -> Result<FirebaseToken, AuthError> {
        if id_token != "valid-token" {
            return Err(TokenVerificationError::InvalidToken("unknown token".to_string()).into());
        }
        Ok(FirebaseToken {
            aud: "test-project".to_string(),
            iss: "https://securetoken.google.com/test-project".to_string(),
            sub: "user-123".to_string(),
            exp: 2_000_000_000,
            iat: 1_700_000_000,
            auth_time: 1_700_000_000,
            user_id: "user-123".to_string(),
            claims: Map::new(),
        })
    }
}

fn headers(value: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(value) = value {
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
    }
    headers
}

fn request(authorization: Option<&str>) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder().uri("/protected");
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn layered_router(reached: Arc<AtomicBool>) -> Router {
    Router::new()
        .route(
            "/protected",
            get(move |AuthenticatedUser(ctx): AuthenticatedUser| {
                let reached = reached.clone();
                async move {
                    reached.store(true, Ordering::SeqCst);
                    ctx.uid
                }
            }),
        )
        .layer(FirebaseAuthLayer::new(StaticVerifier))
}

fn from_fn_router(reached: Arc<AtomicBool>) -> Router {
    Router::new()
        .route(
            "/protected",
            get(move |req: Request| {
                let reached = reached.clone();
                async move {
                    reached.store(true, Ordering::SeqCst);
                    let uid = uid_from_extensions(req.extensions()).unwrap().to_string();
                    let token = token_from_extensions(req.extensions()).unwrap();
                    assert_eq!(token.aud, "test-project");
                    uid
                }
            }),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::new(StaticVerifier),
            require_auth::<StaticVerifier>,
        ))
}

#[test]
fn test_extract_bearer_token() {
    assert_eq!(extract_bearer_token(&headers(Some("Bearer abc123"))).unwrap(), "abc123");

    for value in [None, Some("Token abc123"), Some(""), Some("bearer abc123")] {
        let err = extract_bearer_token(&headers(value)).unwrap_err();
        assert!(
            matches!(err, AuthError::MissingOrMalformedHeader(_)),
            "{:?} should be rejected",
            value
        );
    }
}

#[test]
fn test_extract_bearer_token_messages() {
    let missing = extract_bearer_token(&headers(None)).unwrap_err();
    assert_eq!(missing.to_string(), "authorization header is required");

    let malformed = extract_bearer_token(&headers(Some("Basic dXNlcg=="))).unwrap_err();
    assert_eq!(
        malformed.to_string(),
        "authorization header must be in the format 'Bearer {token}'"
    );
}

#[test]
fn test_accessors_without_context() {
    let extensions = Extensions::new();

    let err = uid_from_extensions(&extensions).unwrap_err();
    assert!(matches!(err, AuthError::ContextMissing("uid")));
    assert_eq!(err.to_string(), "unauthorized: uid not found in context");

    let err = token_from_extensions(&extensions).unwrap_err();
    assert!(matches!(err, AuthError::ContextMissing("token")));
}

#[tokio::test]
async fn test_layer_passes_valid_token() {
    let reached = Arc::new(AtomicBool::new(false));
    let app = layered_router(reached.clone());

    let response = app.oneshot(request(Some("Bearer valid-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user-123");
    assert!(reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_layer_rejects_bad_token() {
    let reached = Arc::new(AtomicBool::new(false));
    let app = layered_router(reached.clone());

    let response = app.oneshot(request(Some("Bearer bad-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.starts_with("Invalid token: "));
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_layer_rejects_missing_header() {
    let reached = Arc::new(AtomicBool::new(false));
    let app = layered_router(reached.clone());

    let response = app.oneshot(request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_text(response).await, "authorization header is required");
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_require_auth_passes_valid_token() {
    let reached = Arc::new(AtomicBool::new(false));
    let app = from_fn_router(reached.clone());

    let response = app.oneshot(request(Some("Bearer valid-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "user-123");
    assert!(reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_require_auth_rejects_bad_token() {
    let reached = Arc::new(AtomicBool::new(false));
    let app = from_fn_router(reached.clone());

    let response = app.oneshot(request(Some("Bearer bad-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!reached.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_extractor_without_middleware_is_unauthorized() {
    let app = Router::new().route(
        "/protected",
        get(|AuthenticatedUser(ctx): AuthenticatedUser| async move { ctx.uid }),
    );

    let response = app.oneshot(request(Some("Bearer valid-token"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
