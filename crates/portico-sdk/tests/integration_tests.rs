//! Integration tests for the session-aware platform client

use async_trait::async_trait;
use portico_sdk::{
    ApiError, ClientBuilder, MemoryCredentialStore, PlatformClient, RequestOptions,
    SessionCredentials, SessionSink,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every persisted session id
#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingSink {
    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionSink for RecordingSink {
    async fn persist(&self, account: &str, new_sid: &str) -> portico_sdk::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push((account.to_string(), new_sid.to_string()));
        Ok(())
    }
}

fn client(server: &MockServer, sink: Arc<RecordingSink>) -> PlatformClient {
    portico_common::logging::try_init_test_logging();
    ClientBuilder::new()
        .base_url(server.uri())
        .timeout(Duration::from_secs(10))
        .session_sink(sink)
        .build()
        .unwrap()
}

fn both_credentials() -> SessionCredentials {
    SessionCredentials::new("acme")
        .with_sid("OLDSID")
        .with_access_token("token-123")
}

#[tokio::test]
async fn test_cookie_mode_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .and(header("Cookie", "connect.sid=OLDSID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": [{"name": "acme"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let orgs: Vec<Value> = client(&server, sink.clone())
        .request("/api/v1/orgs", &both_credentials(), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(orgs, vec![json!({"name": "acme"})]);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn test_falls_back_to_bearer_when_cookie_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/teams"))
        .and(header("Cookie", "connect.sid=OLDSID"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/teams"))
        .and(header("Authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": ["core"]})))
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let outcome = client(&server, sink)
        .execute("/api/v1/teams", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome.result, json!(["core"]));
    assert!(outcome.used_fallback);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fallback_on_empty_session_probe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/findSession"))
        .and(header("Cookie", "connect.sid=OLDSID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/auth/findSession"))
        .and(header("Authorization", "Bearer token-123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": {"user": "jo"}})),
        )
        .mount(&server)
        .await;

    let outcome = client(&server, Arc::new(RecordingSink::default()))
        .execute(
            "/api/v1/auth/findSession",
            &both_credentials(),
            &RequestOptions::new(),
        )
        .await
        .unwrap();

    assert!(outcome.used_fallback);
    assert_eq!(outcome.result, json!({"user": "jo"}));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_null_result_elsewhere_does_not_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": null})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server, Arc::new(RecordingSink::default()))
        .execute("/api/v1/roles", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap();

    assert!(!outcome.used_fallback);
    assert_eq!(outcome.result, Value::Null);
}

#[tokio::test]
async fn test_both_attempts_fail_is_session_invalidated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "jwt expired"}})))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute("/api/v1/users", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_session_invalidated());
    assert_eq!(err.status_code(), Some(401));
    assert!(err.message().contains("jwt expired"));
}

#[tokio::test]
async fn test_bearer_mode_error_does_not_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/clients"))
        .and(header("Authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {"message": "Forbidden", "code": "E_PERM", "statusCode": 403}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = SessionCredentials::new("acme").with_access_token("token-123");
    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute(
            "/api/v1/clients",
            &credentials,
            &RequestOptions::new().error_context("Failed to list clients"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Platform { .. }));
    assert_eq!(err.message(), "Failed to list clients: Forbidden");
    assert_eq!(err.code(), Some("E_PERM"));
    assert_eq!(err.status_code(), Some(403));
}

#[tokio::test]
async fn test_cookie_error_without_bearer_surfaces_platform_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let credentials = SessionCredentials::new("acme").with_sid("OLDSID");
    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute("/api/v1/orgs", &credentials, &RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Platform { .. }));
    assert_eq!(err.status_code(), Some(401));
    assert_eq!(err.message(), "Unauthorized");
}

#[tokio::test]
async fn test_connection_refused_is_not_retried() {
    // Reserve a port, then free it so nothing listens there.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let client = ClientBuilder::new()
        .base_url(format!("http://127.0.0.1:{port}"))
        .build()
        .unwrap();

    let err = client
        .execute("/api/v1/orgs", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap_err();

    assert!(err.is_transport());
    assert!(!err.is_session_invalidated());
}

#[tokio::test]
async fn test_missing_credentials_is_invalid_account() {
    let server = MockServer::start().await;
    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute(
            "/api/v1/orgs",
            &SessionCredentials::new("acme"),
            &RequestOptions::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidAccount));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_session_id_is_never_sent_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
        .mount(&server)
        .await;

    let credentials = SessionCredentials::new("acme").with_sid("bad\nsid");
    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute("/api/v1/orgs", &credentials, &RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidRequest { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_call_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/tooling"))
        .and(body_json(json!({"client": "cli"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {"ok": true}})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server, Arc::new(RecordingSink::default()))
        .execute(
            "/api/v1/auth/tooling",
            &SessionCredentials::new("acme"),
            &RequestOptions::new()
                .json_value(json!({"client": "cli"}))
                .bootstrap(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result, json!({"ok": true}));
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    assert!(requests[0].headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_rotated_cookie_is_persisted_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=NEWVALUE; Path=/; HttpOnly")
                .set_body_json(json!({"result": []})),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let outcome = client(&server, sink.clone())
        .execute("/api/v1/orgs", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome.new_sid.as_deref(), Some("NEWVALUE"));
    assert_eq!(
        sink.calls(),
        vec![("acme".to_string(), "NEWVALUE".to_string())]
    );
}

#[tokio::test]
async fn test_rotated_cookie_persisted_after_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .and(header("Cookie", "connect.sid=OLDSID"))
        .respond_with(
            ResponseTemplate::new(401)
                .insert_header("set-cookie", "connect.sid=IGNORED; Path=/")
                .set_body_json(json!({"message": "expired"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .and(header("Authorization", "Bearer token-123"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=NEWVALUE; Path=/; HttpOnly")
                .set_body_json(json!({"result": []})),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let outcome = client(&server, sink.clone())
        .execute("/api/v1/orgs", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap();

    assert!(outcome.used_fallback);
    assert_eq!(
        sink.calls(),
        vec![("acme".to_string(), "NEWVALUE".to_string())]
    );
}

#[tokio::test]
async fn test_other_cookies_are_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "theme=dark; Path=/")
                .set_body_json(json!({"result": []})),
        )
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let outcome = client(&server, sink.clone())
        .execute("/api/v1/orgs", &both_credentials(), &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome.new_sid, None);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn test_result_key_and_whole_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/packages"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"packages": ["a"], "total": 1})),
        )
        .mount(&server)
        .await;

    let client = client(&server, Arc::new(RecordingSink::default()));
    let credentials = both_credentials();

    let packages: Vec<String> = client
        .request(
            "/api/v1/packages",
            &credentials,
            RequestOptions::new().result_key("packages"),
        )
        .await
        .unwrap();
    assert_eq!(packages, vec!["a".to_string()]);

    let body: Value = client
        .request(
            "/api/v1/packages",
            &credentials,
            RequestOptions::new().whole_body(),
        )
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_structured_error_in_success_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/teams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"description": "Team already exists", "code": "E_EXISTS"}
        })))
        .mount(&server)
        .await;

    let err = client(&server, Arc::new(RecordingSink::default()))
        .execute(
            "/api/v1/teams",
            &both_credentials(),
            &RequestOptions::new()
                .json_value(json!({"name": "core"}))
                .error_context("Failed to create team"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.message(), "Failed to create team: Team already exists");
    assert_eq!(err.code(), Some("E_EXISTS"));
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn test_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "not a list"})))
        .mount(&server)
        .await;

    let result: portico_sdk::Result<Vec<String>> = client(&server, Arc::new(RecordingSink::default()))
        .request("/api/v1/orgs", &both_credentials(), RequestOptions::new())
        .await;

    assert!(matches!(result, Err(ApiError::Decode { .. })));
}

#[tokio::test]
async fn test_request_for_account_uses_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orgs"))
        .and(header("Cookie", "connect.sid=OLDSID"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=ROTATED; Path=/")
                .set_body_json(json!({"result": ["acme"]})),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    store.insert(both_credentials()).await;

    let client = ClientBuilder::new()
        .base_url(server.uri())
        .token_provider(store.clone())
        .session_sink(store.clone())
        .build()
        .unwrap();

    let orgs: Vec<String> = client
        .request_for_account("acme", "/api/v1/orgs", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(orgs, vec!["acme".to_string()]);
    assert_eq!(
        store.get("acme").await.unwrap().sid.as_deref(),
        Some("ROTATED")
    );
}

#[tokio::test]
async fn test_request_for_unknown_account() {
    let server = MockServer::start().await;
    let client = ClientBuilder::new()
        .base_url(server.uri())
        .token_provider(Arc::new(MemoryCredentialStore::new()))
        .build()
        .unwrap();

    let result: portico_sdk::Result<Value> = client
        .request_for_account("ghost", "/api/v1/orgs", RequestOptions::new())
        .await;

    assert!(matches!(result, Err(ApiError::InvalidAccount)));
}
