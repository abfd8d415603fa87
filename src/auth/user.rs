use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::models::{UpdateUserRequest, UserRecord, DELETE_DISPLAY_NAME, DELETE_PHOTO_URL};

/// Identity fields shared by every application, plus one slot `data` for the
/// application's own user profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseUser<T> {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone_number: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub disabled: bool,

    pub email_verified: bool,
    pub phone_verified: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub claims: Map<String, Value>,

    pub data: T,
}

impl<T> BaseUser<T> {
    /// Builds a user from an account record. Claims that fail to decode are
    /// dropped. A user counts as phone verified when a phone number is set.
    pub fn from_user_record(user: &UserRecord, data: T) -> Self {
        let created_at = user.creation_time().unwrap_or_default();
        let phone_number = user.phone_number.clone().unwrap_or_default();

        Self {
            id: user.local_id.clone(),
            email: user.email.clone().unwrap_or_default(),
            phone_verified: !phone_number.is_empty(),
            phone_number,
            display_name: user.display_name.clone().unwrap_or_default(),
            photo_url: user.photo_url.clone().unwrap_or_default(),
            created_at,
            updated_at: created_at,
            last_login_at: user.last_sign_in_time(),
            disabled: user.disabled,
            email_verified: user.email_verified,
            claims: user.custom_claims().unwrap_or_default(),
            data,
        }
    }

    /// The profile fields as an update request. Empty display name or photo
    /// URL clear the attribute upstream.
    pub fn to_update_request(&self) -> UpdateUserRequest {
        let mut delete_attribute = Vec::new();
        let display_name = non_empty(&self.display_name);
        if display_name.is_none() {
            delete_attribute.push(DELETE_DISPLAY_NAME.to_string());
        }
        let photo_url = non_empty(&self.photo_url);
        if photo_url.is_none() {
            delete_attribute.push(DELETE_PHOTO_URL.to_string());
        }

        UpdateUserRequest {
            local_id: self.id.clone(),
            email: non_empty(&self.email),
            email_verified: Some(self.email_verified),
            display_name,
            photo_url,
            disabled: Some(self.disabled),
            delete_attribute: Some(delete_attribute).filter(|d| !d.is_empty()),
            ..Default::default()
        }
    }

    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// True when `role` is listed in the `roles` array claim, or when a
    /// boolean claim named `role` is `true`.
    pub fn has_role(&self, role: &str) -> bool {
        let in_roles = self
            .claims
            .get("roles")
            .and_then(Value::as_array)
            .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)));

        in_roles || self.claims.get(role).and_then(Value::as_bool).unwrap_or(false)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests;
