use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A user account as returned by the Identity Toolkit API.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    pub local_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub disabled: bool,
    pub provider_user_info: Option<Vec<ProviderUserInfo>>,
    pub custom_attributes: Option<String>, // JSON string for custom claims
    pub tenant_id: Option<String>,
    /// Creation time in milliseconds since the epoch, as a decimal string.
    pub created_at: Option<String>,
    /// Last sign-in time in milliseconds since the epoch, as a decimal string.
    pub last_login_at: Option<String>,
    pub last_refresh_at: Option<String>,
    /// Tokens issued before this time (seconds since the epoch) are revoked.
    pub valid_since: Option<String>,
}

impl UserRecord {
    /// Decodes `customAttributes`. A missing or blank value yields an empty map.
    pub fn custom_claims(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match self.custom_attributes.as_deref().map(str::trim) {
            None | Some("") => Ok(Map::new()),
            Some(raw) => serde_json::from_str(raw),
        }
    }

    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        parse_millis(self.created_at.as_deref())
    }

    pub fn last_sign_in_time(&self) -> Option<DateTime<Utc>> {
        parse_millis(self.last_login_at.as_deref())
    }

    pub fn tokens_valid_after(&self) -> Option<DateTime<Utc>> {
        self.valid_since
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

fn parse_millis(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|ms| *ms > 0)
        .and_then(DateTime::from_timestamp_millis)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUserInfo {
    pub provider_id: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub federated_id: Option<String>,
    pub email: Option<String>,
    pub raw_id: Option<String>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Attribute names accepted by `deleteAttribute`.
pub const DELETE_DISPLAY_NAME: &str = "DISPLAY_NAME";
pub const DELETE_PHOTO_URL: &str = "PHOTO_URL";

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub local_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "disableUser")]
    pub disabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_attributes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_attribute: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_provider: Option<Vec<String>>,
}

/// Response of `accounts` and `accounts:update`. Only the id is guaranteed.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AccountIdResponse {
    pub local_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ListUsersResponse {
    pub users: Vec<UserRecord>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAccountInfoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GetAccountInfoResponse {
    pub users: Option<Vec<UserRecord>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteAccountRequest {
    pub local_id: String,
}
