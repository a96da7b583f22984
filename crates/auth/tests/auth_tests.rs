use reqwest::Client;
use schoolhub_auth::{Auth, AuthChangeEvent, AuthError, AuthOptions};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_json(user_id: &str, email: &str) -> serde_json::Value {
    json!({
        "access_token": "test_access_token",
        "token_type": "bearer",
        "expires_in": 3600,
        "expires_at": 4102444800i64,
        "refresh_token": "test_refresh_token",
        "user": {
            "id": user_id,
            "email": email,
            "role": "authenticated"
        }
    })
}

#[tokio::test]
async fn test_sign_in_then_sign_out_emits_events() {
    // start the mock server
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "test_anon_key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(session_json("user-1", "t@example.com")),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("Authorization", "Bearer test_access_token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let auth = Auth::new(
        &mock_server.uri(),
        "test_anon_key",
        Client::new(),
        AuthOptions::default(),
    );
    let mut events = auth.on_auth_state_change();

    let session = auth
        .sign_in_with_password("t@example.com", "password123")
        .await
        .unwrap();
    assert_eq!(session.user_id(), "user-1");
    assert_eq!(session.expires_at, Some(4102444800));

    let signed_in = events.recv().await.unwrap();
    assert_eq!(signed_in.event, AuthChangeEvent::SignedIn);
    assert_eq!(signed_in.session.unwrap().user.id, "user-1");

    auth.sign_out().await.unwrap();
    let signed_out = events.recv().await.unwrap();
    assert_eq!(signed_out.event, AuthChangeEvent::SignedOut);
    assert!(signed_out.session.is_none());
    assert!(auth.get_session().is_none());
}

#[tokio::test]
async fn test_get_user_uses_session_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("Authorization", "Bearer test_access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "t@example.com"
        })))
        .mount(&mock_server)
        .await;

    let auth = Auth::new(
        &mock_server.uri(),
        "test_anon_key",
        Client::new(),
        AuthOptions::default(),
    );

    assert!(matches!(
        auth.get_user().await,
        Err(AuthError::MissingSession)
    ));

    auth.set_session(serde_json::from_value(session_json("user-1", "t@example.com")).unwrap());
    let user = auth.get_user().await.unwrap();
    assert_eq!(user.email.as_deref(), Some("t@example.com"));
}

#[tokio::test]
async fn test_server_error_is_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&mock_server)
        .await;

    let auth = Auth::new(
        &mock_server.uri(),
        "test_anon_key",
        Client::new(),
        AuthOptions::default(),
    );

    match auth.sign_up("t@example.com", "password123").await {
        Err(AuthError::ApiError(msg)) => assert!(msg.contains("upstream down")),
        other => panic!("Expected ApiError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_admin_create_user() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/admin/users"))
        .and(header("apikey", "service_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "created-id",
            "email": "teacher@school.com"
        })))
        .mount(&mock_server)
        .await;

    let mut auth = Auth::new(
        &mock_server.uri(),
        "test_anon_key",
        Client::new(),
        AuthOptions::default(),
    );
    assert!(auth.admin().is_none());
    auth.init_admin("service_key");

    let user = auth
        .admin()
        .unwrap()
        .create_user("teacher@school.com", Some("teacher123"), None, true)
        .await
        .unwrap();
    assert_eq!(user.id, "created-id");
}
