use super::*;

// =============================================================
// Helpers
// =============================================================

fn make_user() -> User {
    User {
        id: 1,
        name: "Old".to_owned(),
        email: "a@b.com".to_owned(),
        role: "x".to_owned(),
        phone: None,
        profile_photo_path: None,
    }
}

// =============================================================
// User
// =============================================================

#[test]
fn user_deserializes_without_optional_fields() {
    let user: User =
        serde_json::from_str(r#"{"id":7,"name":"Sari","email":"s@geo.id","role":"relawan"}"#).unwrap();
    assert_eq!(user.id, 7);
    assert_eq!(user.phone, None);
    assert_eq!(user.profile_photo_path, None);
}

#[test]
fn user_ignores_unknown_backend_fields() {
    let user: User = serde_json::from_str(
        r#"{"id":7,"name":"Sari","email":"s@geo.id","role":"admin","created_at":"2024-01-01"}"#,
    )
    .unwrap();
    assert_eq!(user.role, "admin");
}

#[test]
fn user_serialization_omits_absent_optionals() {
    let raw = serde_json::to_string(&make_user()).unwrap();
    assert!(!raw.contains("phone"));
    assert!(!raw.contains("profile_photo_path"));
}

#[test]
fn merged_replaces_only_patched_fields() {
    let patch = UserPatch { name: Some("New".to_owned()), ..UserPatch::default() };
    let next = make_user().merged(&patch);
    assert_eq!(
        next,
        User {
            id: 1,
            name: "New".to_owned(),
            email: "a@b.com".to_owned(),
            role: "x".to_owned(),
            phone: None,
            profile_photo_path: None,
        }
    );
}

#[test]
fn merged_sets_optional_fields() {
    let patch = UserPatch {
        phone: Some("0812".to_owned()),
        profile_photo_path: Some("photos/1.png".to_owned()),
        ..UserPatch::default()
    };
    let next = make_user().merged(&patch);
    assert_eq!(next.phone.as_deref(), Some("0812"));
    assert_eq!(next.profile_photo_path.as_deref(), Some("photos/1.png"));
    assert_eq!(next.name, "Old");
}

#[test]
fn empty_patch_is_detected() {
    assert!(UserPatch::default().is_empty());
    assert!(!UserPatch { role: Some("y".to_owned()), ..UserPatch::default() }.is_empty());
}

// =============================================================
// LoginResponse
// =============================================================

#[test]
fn login_response_with_token_and_user_yields_credentials() {
    let resp: LoginResponse = serde_json::from_value(serde_json::json!({
        "token": "T",
        "user": {"id": 1, "name": "Old", "email": "a@b.com", "role": "x"}
    }))
    .unwrap();
    let (token, user) = resp.into_credentials().unwrap();
    assert_eq!(token, "T");
    assert_eq!(user, make_user());
}

#[test]
fn login_response_missing_user_yields_none() {
    let resp: LoginResponse = serde_json::from_value(serde_json::json!({ "token": "T" })).unwrap();
    assert!(resp.into_credentials().is_none());
}

#[test]
fn login_response_empty_token_yields_none() {
    let resp = LoginResponse { token: Some(String::new()), user: Some(make_user()) };
    assert!(resp.into_credentials().is_none());
}

// =============================================================
// ApiError
// =============================================================

#[test]
fn status_error_reports_unauthorized() {
    let err = ApiError::Status { status: 401, body: String::new() };
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "server returned status 401");
}

#[test]
fn non_status_error_has_no_status() {
    let err = ApiError::InvalidUrl("nope".to_owned());
    assert_eq!(err.status(), None);
    assert!(!err.is_unauthorized());
}
