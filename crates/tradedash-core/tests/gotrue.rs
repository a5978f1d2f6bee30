use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tradedash_core::api::{ApiClient, TokenSource};
use tradedash_core::auth::{
    AuthChangeEvent, AuthProvider, GoTrueProvider, Session, SessionFile, SessionStore, User,
};

const ANON_KEY: &str = "anon-key";

fn token_body(access: &str, refresh: &str, expires_in: i64) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": expires_in,
        "expires_at": Utc::now().timestamp() + expires_in,
        "refresh_token": refresh,
        "user": {"id": "user-1", "email": "trader@example.com", "aud": "authenticated"}
    })
}

async fn mount_password_grant(server: &MockServer, access: &str, expires_in: i64) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", ANON_KEY))
        .and(body_json(json!({"email": "trader@example.com", "password": "hunter2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, "refresh-1", expires_in)))
        .mount(server)
        .await;
}

fn provider(server: &MockServer) -> GoTrueProvider {
    GoTrueProvider::new(&format!("{}/auth/v1/", server.uri()), ANON_KEY).expect("provider")
}

#[tokio::test]
async fn sign_in_emits_signed_in_with_matching_sequence() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 3600).await;

    let provider = provider(&server);
    let mut events = provider.subscribe();

    let snapshot = provider
        .sign_in_with_password("trader@example.com", "hunter2")
        .await
        .expect("sign in");
    let session = snapshot.session.clone().expect("session");
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.user.email.as_deref(), Some("trader@example.com"));

    let change = events.recv().await.expect("event");
    assert_eq!(change.event, AuthChangeEvent::SignedIn);
    assert_eq!(change.sequence, snapshot.sequence);

    let current = provider.get_session().await.expect("get session");
    assert_eq!(current, snapshot);
}

#[tokio::test]
async fn provider_errors_pass_through_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "error_code": "invalid_credentials",
            "msg": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let err = provider
        .sign_in_with_password("trader@example.com", "wrong")
        .await
        .expect_err("should fail");
    assert_eq!(err.to_string(), "Invalid login credentials");
    assert_eq!(err.status(), Some(400));
    assert!(provider.get_session().await.expect("session").session.is_none());
}

#[tokio::test]
async fn sign_up_pending_confirmation_returns_user_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-2",
            "email": "new@example.com",
            "confirmation_sent_at": "2024-05-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    let response = provider.sign_up("new@example.com", "pw").await.expect("sign up");
    assert_eq!(response.user.map(|u| u.id), Some("user-2".to_string()));
    assert!(response.session.is_none());
    assert!(provider.get_session().await.expect("session").session.is_none());
}

#[tokio::test]
async fn sign_out_clears_even_when_server_forgot_session() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"msg": "Session not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider
        .sign_in_with_password("trader@example.com", "hunter2")
        .await
        .expect("sign in");

    let mut events = provider.subscribe();
    let snapshot = provider.sign_out().await.expect("sign out");
    assert!(snapshot.session.is_none());
    assert_eq!(events.recv().await.expect("event").event, AuthChangeEvent::SignedOut);
}

#[tokio::test]
async fn expiring_session_is_refreshed_on_lookup() {
    let server = MockServer::start().await;
    // Expires within the refresh window
    mount_password_grant(&server, "access-old", 60).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .and(body_json(json!({"refresh_token": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-new", "refresh-2", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);
    let signed_in = provider
        .sign_in_with_password("trader@example.com", "hunter2")
        .await
        .expect("sign in");

    let mut events = provider.subscribe();
    let refreshed = provider.get_session().await.expect("refresh");
    assert!(refreshed.sequence > signed_in.sequence);
    assert_eq!(
        refreshed.session.as_ref().map(|s| s.access_token.as_str()),
        Some("access-new")
    );
    assert_eq!(events.recv().await.expect("event").event, AuthChangeEvent::TokenRefreshed);

    // Fresh token: no second refresh
    provider.get_session().await.expect("lookup");
}

#[tokio::test]
async fn rejected_refresh_signs_out() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-old", 60).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid Refresh Token: Already Used"
        })))
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider
        .sign_in_with_password("trader@example.com", "hunter2")
        .await
        .expect("sign in");

    let snapshot = provider.get_session().await.expect("lookup");
    assert!(snapshot.session.is_none());
}

#[tokio::test]
async fn session_is_persisted_and_restored() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 3600).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let first = provider(&server).with_storage(SessionFile::new(dir.path()));
    first
        .sign_in_with_password("trader@example.com", "hunter2")
        .await
        .expect("sign in");

    let second = provider(&server).with_storage(SessionFile::new(dir.path()));
    let restored = second.restore().await.expect("restore").expect("session");
    assert_eq!(restored.access_token, "access-1");
    assert_eq!(
        second.get_session().await.expect("lookup").session,
        Some(restored)
    );
}

#[tokio::test]
async fn store_and_client_share_the_session() {
    let server = MockServer::start().await;
    mount_password_grant(&server, "access-1", 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/settings"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"binance_api_key": "A", "binance_secret_key": "B", "openai_api_key": "C"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn AuthProvider> = Arc::new(provider(&server));
    let store = Arc::new(SessionStore::new(provider));
    store.initialize().await.expect("initialize");
    assert!(store.user().is_none());

    store.sign_in("trader@example.com", "hunter2").await.expect("sign in");
    assert_eq!(
        store.user(),
        Some(User { id: "user-1".into(), email: Some("trader@example.com".into()) })
    );

    let client = ApiClient::new(&server.uri())
        .expect("client")
        .with_token_source(store.clone());
    let settings = client.user_settings().await.expect("settings");
    assert_eq!(settings.data.map(|s| s.openai_api_key), Some("C".to_string()));

    store.sign_out().await.expect("sign out");
    assert!(store.session().is_none());
    assert_eq!(store.access_token().await, None);

    // The listener saw the same changes; nothing resurrects the session
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = store.state();
    assert!(state.session.is_none());
    assert_eq!(state.user().is_some(), state.session.is_some());
}

#[test]
fn session_debug_is_safe_to_log() {
    let session = Session {
        access_token: "secret".into(),
        refresh_token: None,
        token_type: "bearer".into(),
        expires_at: None,
        user: User { id: "u".into(), email: None },
    };
    assert!(!format!("{:?}", session).contains("secret"));
}
