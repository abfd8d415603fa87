use super::*;
use serde_json::json;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Profile {
    plan: String,
}

fn record() -> UserRecord {
    UserRecord {
        local_id: "uid-1".to_string(),
        email: Some("ada@example.com".to_string()),
        email_verified: true,
        display_name: Some("Ada".to_string()),
        phone_number: Some("+15555550100".to_string()),
        custom_attributes: Some(r#"{"roles":["editor"],"admin":true,"beta":false}"#.to_string()),
        created_at: Some("1700000000000".to_string()),
        last_login_at: Some("1700000500000".to_string()),
        ..Default::default()
    }
}

#[test]
fn test_from_user_record() {
    let user = BaseUser::from_user_record(&record(), Profile { plan: "pro".to_string() });

    assert_eq!(user.id, "uid-1");
    assert_eq!(user.email, "ada@example.com");
    assert!(user.email_verified);
    assert!(user.phone_verified);
    assert_eq!(user.created_at.timestamp(), 1_700_000_000);
    assert_eq!(user.updated_at, user.created_at);
    assert_eq!(user.last_login_at.map(|t| t.timestamp()), Some(1_700_000_500));
    assert_eq!(user.data.plan, "pro");
    assert_eq!(user.claim("admin"), Some(&json!(true)));
}

#[test]
fn test_has_role() {
    let user = BaseUser::from_user_record(&record(), ());

    assert!(user.has_role("editor"));
    assert!(user.has_role("admin"));
    assert!(!user.has_role("beta"));
    assert!(!user.has_role("owner"));

    let no_claims = BaseUser::from_user_record(&UserRecord::default(), ());
    assert!(!no_claims.has_role("editor"));
    assert!(!no_claims.phone_verified);
    assert_eq!(no_claims.last_login_at, None);
}

#[test]
fn test_to_update_request() {
    let mut user = BaseUser::from_user_record(&record(), ());
    user.photo_url.clear();

    let request = user.to_update_request();
    assert_eq!(request.local_id, "uid-1");
    assert_eq!(request.display_name.as_deref(), Some("Ada"));
    assert_eq!(request.photo_url, None);
    assert_eq!(request.delete_attribute, Some(vec!["PHOTO_URL".to_string()]));

    let body = serde_json::to_value(&request).unwrap();
    assert_eq!(body["disableUser"], json!(false));
    assert_eq!(body["emailVerified"], json!(true));
}

#[test]
fn test_serializes_camel_case() {
    let user = BaseUser::from_user_record(&record(), Profile { plan: "free".to_string() });
    let value = serde_json::to_value(&user).unwrap();

    assert_eq!(value["phoneNumber"], "+15555550100");
    assert_eq!(value["emailVerified"], true);
    assert_eq!(value["data"]["plan"], "free");
    assert!(value.get("photoUrl").is_none());
}
