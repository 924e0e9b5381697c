use std::sync::Mutex;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::net::types::User;
use crate::util::csrf::PageDocument;

// =============================================================
// Helpers
// =============================================================

#[derive(Default)]
struct RecordingNavigator {
    locations: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, location: &str) {
        self.locations.lock().unwrap().push(location.to_owned());
    }
}

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

fn client_for(uri: &str, storage: &SessionStorage) -> ApiClient {
    ApiClient::new(ClientConfig::new(uri).unwrap(), storage.clone(), None).unwrap()
}

fn seeded_storage() -> SessionStorage {
    let storage = SessionStorage::in_memory();
    storage.set_token(Some("T")).unwrap();
    storage.set_user(Some(&make_user())).unwrap();
    storage
}

/// A base URL nothing is listening on.
fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// =============================================================
// Request headers
// =============================================================

#[tokio::test]
async fn every_request_carries_standard_headers_and_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .and(header("accept", "application/json"))
        .and(header("content-type", "application/json"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(header("authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &seeded_storage());
    let reports: Vec<serde_json::Value> = client.get_json("/reports").await.unwrap();
    assert!(reports.is_empty());
}

#[tokio::test]
async fn request_without_token_has_no_authorization_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &SessionStorage::in_memory());
    client.send(Method::GET, "/news", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn default_credential_is_used_when_storage_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .and(header("authorization", "Bearer mem"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(make_user())))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &SessionStorage::in_memory());
    client.set_default_token(Some("mem".to_owned()));
    let user: User = client.get_json("/user").await.unwrap();
    assert_eq!(user, make_user());
}

#[tokio::test]
async fn csrf_token_is_attached_from_page() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/reports"))
        .and(header("x-csrf-token", "page-token"))
        .and(body_json(json!({"title": "Banjir"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let doc: Arc<dyn CsrfSource> = Arc::new(PageDocument::new(r#"<meta name="csrf-token" content="page-token">"#));
    let client =
        ApiClient::new(ClientConfig::new(&server.uri()).unwrap(), SessionStorage::in_memory(), Some(doc)).unwrap();
    let created: serde_json::Value = client.post_json("/reports", &json!({"title": "Banjir"})).await.unwrap();
    assert_eq!(created["id"], 9);
}

#[test]
fn prepare_rejects_absolute_urls() {
    let client = client_for("http://127.0.0.1:8000/api", &seeded_storage());
    let err = client.prepare(Method::GET, "https://elsewhere.example/steal", None).unwrap_err();
    assert!(matches!(err, ApiError::InvalidUrl(_)));
}

#[test]
fn prepare_joins_onto_base_url() {
    let client = client_for("http://127.0.0.1:8000/api", &SessionStorage::in_memory());
    let request = client.prepare(Method::GET, "/user", None).unwrap();
    assert_eq!(request.url, "http://127.0.0.1:8000/api/user");
}

// =============================================================
// Responses
// =============================================================

#[tokio::test]
async fn unauthorized_response_clears_session_and_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthenticated."})))
        .mount(&server)
        .await;

    let storage = seeded_storage();
    let client = client_for(&server.uri(), &storage);
    client.set_default_token(Some("T".to_owned()));

    let err = client.send(Method::GET, "/reports", None).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(storage.token(), None);
    assert_eq!(storage.user(), None);
    assert_eq!(client.default_token(), None);
}

#[tokio::test]
async fn server_error_keeps_session_and_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reports"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let storage = seeded_storage();
    let client = client_for(&server.uri(), &storage);
    match client.send(Method::GET, "/reports", None).await.unwrap_err() {
        ApiError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(storage.token().as_deref(), Some("T"));
}

#[tokio::test]
async fn transport_failure_propagates_without_touching_session() {
    let storage = seeded_storage();
    let client = client_for(&dead_base_url(), &storage);
    let err = client.send(Method::GET, "/reports", None).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert_eq!(storage.token().as_deref(), Some("T"));
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri(), &SessionStorage::in_memory());
    let err = client.get_json::<User>("/user").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

// =============================================================
// Logout helper
// =============================================================

#[tokio::test]
async fn logout_helper_notifies_server_clears_and_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .and(header("authorization", "Bearer T"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let storage = seeded_storage();
    let client = client_for(&server.uri(), &storage);
    let navigator = RecordingNavigator::default();

    let notification = client.logout(&navigator);
    assert_eq!(storage.token(), None);
    assert_eq!(storage.user(), None);
    assert_eq!(*navigator.locations.lock().unwrap(), vec![format!("{}/login", server.uri())]);

    notification.await.unwrap();
}

#[tokio::test]
async fn logout_helper_cleans_up_when_server_is_unreachable() {
    let storage = seeded_storage();
    let client = client_for(&dead_base_url(), &storage);
    let navigator = RecordingNavigator::default();

    client.logout(&navigator).await.unwrap();

    assert_eq!(storage.token(), None);
    assert_eq!(storage.user(), None);
    assert_eq!(navigator.locations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn late_logout_401_does_not_clear_a_newer_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/logout"))
        .respond_with(ResponseTemplate::new(401).set_delay(std::time::Duration::from_millis(50)))
        .mount(&server)
        .await;

    let storage = seeded_storage();
    let client = client_for(&server.uri(), &storage);
    let notification = client.logout(&RecordingNavigator::default());

    storage.set_token(Some("fresh")).unwrap();
    notification.await.unwrap();
    assert_eq!(storage.token().as_deref(), Some("fresh"));
}

#[test]
fn login_location_uses_api_origin() {
    let mut config = ClientConfig::new("https://siaga.example/api").unwrap();
    config.login_route = "/masuk".to_owned();
    let client = ApiClient::new(config, SessionStorage::in_memory(), None).unwrap();
    assert_eq!(client.login_location(), "https://siaga.example/masuk");
}
