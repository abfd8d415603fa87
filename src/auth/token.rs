use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{Map, Value};
use yup_oauth2::ServiceAccountKey;

use crate::auth::AuthError;

/// Audience of every custom token.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Lifetime of a custom token, in seconds.
pub const CUSTOM_TOKEN_LIFETIME: i64 = 3600;

const MAX_UID_LENGTH: usize = 128;

/// Claim names Firebase reserves for itself.
pub(crate) const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase",
    "iat", "iss", "jti", "nbf", "nonce", "sub",
];

#[derive(Serialize)]
struct CustomTokenClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'static str,
    iat: i64,
    exp: i64,
    uid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    claims: Option<&'a Map<String, Value>>,
}

/// Signs custom tokens with a service account's private key.
pub struct CustomTokenSigner {
    client_email: String,
    key_id: Option<String>,
    key: EncodingKey,
}

impl CustomTokenSigner {
    pub fn from_service_account(key: &ServiceAccountKey) -> Result<Self, AuthError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(AuthError::TokenSigning)?;

        Ok(Self {
            client_email: key.client_email.clone(),
            key_id: key.private_key_id.clone(),
            key: encoding_key,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Creates a signed token the client SDKs can exchange for an ID token.
    /// `claims` are embedded only when present and non-empty.
    pub fn sign(&self, uid: &str, claims: Option<&Map<String, Value>>) -> Result<String, AuthError> {
        if uid.is_empty() || uid.chars().count() > MAX_UID_LENGTH {
            return Err(AuthError::InvalidArgument(format!(
                "uid must be a non-empty string with at most {} characters",
                MAX_UID_LENGTH
            )));
        }
        let claims = claims.filter(|c| !c.is_empty());
        if let Some(claims) = claims {
            check_reserved_claims(claims)?;
        }

        let iat = Utc::now().timestamp();
        let payload = CustomTokenClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud: CUSTOM_TOKEN_AUDIENCE,
            iat,
            exp: iat + CUSTOM_TOKEN_LIFETIME,
            uid,
            claims,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();

        encode(&header, &payload, &self.key).map_err(AuthError::TokenSigning)
    }
}

pub(crate) fn check_reserved_claims(claims: &Map<String, Value>) -> Result<(), AuthError> {
    match claims.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
        Some(reserved) => Err(AuthError::InvalidArgument(format!(
            "claim {:?} is reserved and cannot be set",
            reserved
        ))),
        None => Ok(()),
    }
}
