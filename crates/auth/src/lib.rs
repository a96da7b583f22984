//! GoTrue authentication client for schoolhub
//!
//! This crate talks to the identity half of a Supabase project: sign up,
//! sign in, token refresh, sign out, and a broadcast of session changes that
//! the access policy layer mirrors into its own state.

use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;

const CLIENT_INFO: &str = "schoolhub-auth/0.2.0";

/// Errors returned by the identity client
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Error body as GoTrue sends it
#[derive(Debug, Deserialize, Default)]
struct GoTrueErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueErrorBody {
    fn best_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Turns a non-success response into an `AuthError`.
///
/// Credential problems (400/401/403/422) become `AuthenticationError` so
/// callers can route them to the sign-in screen; everything else is an
/// `ApiError` carrying the raw body.
async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error response".to_string());
    let message = serde_json::from_str::<GoTrueErrorBody>(&text)
        .ok()
        .and_then(GoTrueErrorBody::best_message)
        .unwrap_or(text);

    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => AuthError::AuthenticationError(message),
        _ => AuthError::ApiError(format!("{} (Status: {})", message, status)),
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

/// An identity as GoTrue describes it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Tokens for a signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix seconds. GoTrue sends it on most endpoints; filled in locally otherwise.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub token_type: String,
    pub user: User,
}

impl Session {
    /// Fills in `expires_at` from `expires_in` when the server left it out.
    pub fn with_computed_expiry(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(unix_now() + self.expires_in);
        }
        self
    }

    /// Whether the access token has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() >= expires_at,
            None => false,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// What a sign-up returns.
///
/// With email confirmation enabled GoTrue answers with the bare user and no
/// session; otherwise the user is signed in straight away.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session(Session),
    User(User),
}

impl SignUpResponse {
    pub fn user(&self) -> &User {
        match self {
            SignUpResponse::Session(session) => &session.user,
            SignUpResponse::User(user) => user,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SignUpResponse::Session(session) => Some(session),
            SignUpResponse::User(_) => None,
        }
    }
}

/// Kind of session change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A session change and the session that resulted from it
#[derive(Debug, Clone)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    /// Capacity of the session-change broadcast channel.
    pub event_capacity: usize,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            event_capacity: 16,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    users: Vec<User>,
}

/// Identity client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    state_change: broadcast::Sender<AuthStateChange>,
    admin: Option<AdminAuth>,
}

/// Admin client, only usable with the service role key
pub struct AdminAuth {
    url: String,
    service_role_key: String,
    http_client: Client,
}

impl AdminAuth {
    /// Create an admin client
    pub fn new(url: &str, service_role_key: &str, http_client: Client) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            http_client,
        }
    }

    /// Lists users, one page at a time.
    ///
    /// # Arguments
    ///
    /// * `page` - Page number (default 1)
    /// * `per_page` - Users per page (default 50)
    pub async fn list_users(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<Vec<User>, AuthError> {
        let url = format!(
            "{}/auth/v1/admin/users?page={}&per_page={}",
            self.url,
            page.unwrap_or(1),
            per_page.unwrap_or(50)
        );

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("X-Client-Info", CLIENT_INFO)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let list: UserList = response.json().await?;
        Ok(list.users)
    }

    /// Creates a user without signing it in.
    ///
    /// # Arguments
    ///
    /// * `email` - Email address
    /// * `password` - Password (optional)
    /// * `user_metadata` - Metadata stored on the user (optional)
    /// * `email_confirm` - Mark the address as already confirmed
    pub async fn create_user(
        &self,
        email: &str,
        password: Option<&str>,
        user_metadata: Option<serde_json::Value>,
        email_confirm: bool,
    ) -> Result<User, AuthError> {
        let url = format!("{}/auth/v1/admin/users", self.url);

        let mut payload = serde_json::json!({
            "email": email,
            "email_confirm": email_confirm,
        });

        if let Some(pw) = password {
            payload["password"] = serde_json::Value::String(pw.to_string());
        }

        if let Some(metadata) = user_metadata {
            payload["user_metadata"] = metadata;
        }

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let user: User = response.json().await?;
        info!("Created user {} ({})", user.id, email);
        Ok(user)
    }
}

impl Auth {
    /// Create a new identity client
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        let (state_change, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            state_change,
            admin: None,
        }
    }

    /// Enable the admin API
    pub fn init_admin(&mut self, service_role_key: &str) -> &Self {
        self.admin = Some(AdminAuth::new(
            &self.url,
            service_role_key,
            self.http_client.clone(),
        ));
        self
    }

    /// Admin API, when enabled
    pub fn admin(&self) -> Option<&AdminAuth> {
        self.admin.as_ref()
    }

    /// Receiver for session change notifications
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.state_change.subscribe()
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        debug!("Auth state change: {:?}", event);
        if self
            .state_change
            .send(AuthStateChange { event, session })
            .is_err()
        {
            debug!("No listeners for auth state change {:?}", event);
        }
    }

    fn store_session(&self, session: Option<Session>) {
        if session.is_some() && !self.options.persist_session {
            return;
        }
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = session;
    }

    /// Sign up with email and password
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, AuthError> {
        let url = format!("{}/auth/v1/signup", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let result = match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(session) => {
                SignUpResponse::Session(session.with_computed_expiry())
            }
            other => other,
        };

        // keep the session
        if let Some(session) = result.session() {
            self.store_session(Some(session.clone()));
            self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        }

        Ok(result)
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.url);

        let payload = serde_json::json!({
            "email": email,
            "password": password,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let session = response.json::<Session>().await?.with_computed_expiry();
        info!("Signed in user {}", session.user.id);

        self.store_session(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Cached session, if any
    pub fn get_session(&self) -> Option<Session> {
        self.current_session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the cached session, refreshing it first when it has expired.
    ///
    /// An expired session without auto refresh is dropped and reported as
    /// absent.
    pub async fn current_session(&self) -> Result<Option<Session>, AuthError> {
        let session = match self.get_session() {
            Some(session) => session,
            None => return Ok(None),
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        if self.options.auto_refresh_token {
            debug!("Cached session expired, refreshing");
            return self.refresh_session().await.map(Some);
        }

        warn!("Cached session expired and auto refresh is disabled");
        self.store_session(None);
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(None)
    }

    /// Restore a session stored elsewhere
    pub fn set_session(&self, session: Session) {
        let session = session.with_computed_expiry();
        self.store_session(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session));
    }

    /// Fetch the current user
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/user", self.url);

        let response = self
            .http_client
            .get(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let user: User = response.json().await?;
        Ok(user)
    }

    /// Refresh the session
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/token?grant_type=refresh_token", self.url);

        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let new_session = response.json::<Session>().await?.with_computed_expiry();

        self.store_session(Some(new_session.clone()));
        self.emit(AuthChangeEvent::TokenRefreshed, Some(new_session.clone()));

        Ok(new_session)
    }

    /// Sign out
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.get_session().ok_or(AuthError::MissingSession)?;

        let url = format!("{}/auth/v1/logout", self.url);

        let response = self
            .http_client
            .post(&url)
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        // drop the session
        self.store_session(None);
        self.emit(AuthChangeEvent::SignedOut, None);
        info!("Signed out user {}", session.user.id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body(token: &str) -> serde_json::Value {
        serde_json::json!({
            "access_token": token,
            "refresh_token": "test_refresh_token",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": "test_user_id",
                "email": "test@example.com",
                "phone": null,
                "app_metadata": {},
                "user_metadata": {},
                "created_at": "2021-01-01T00:00:00Z",
                "updated_at": "2021-01-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn test_sign_up_with_session() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .and(header("apikey", "test_key"))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(session_body("test_access_token")),
                )
                .mount(&mock_server)
                .await;

            let auth = Auth::new(
                &mock_server.uri(),
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );
            let mut events = auth.on_auth_state_change();

            let result = auth.sign_up("test@example.com", "password123").await;

            assert!(result.is_ok());
            let response = result.unwrap();
            assert_eq!(response.user().email, Some("test@example.com".to_string()));
            let session = response.session().expect("session returned");
            assert_eq!(session.access_token, "test_access_token");
            assert!(session.expires_at.is_some());

            let change = events.try_recv().expect("sign up emits an event");
            assert_eq!(change.event, AuthChangeEvent::SignedIn);
            assert!(auth.get_session().is_some());
        });
    }

    #[test]
    fn test_sign_up_pending_confirmation() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/auth/v1/signup"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "id": "new_user_id",
                    "email": "new@example.com",
                    "created_at": "2021-01-01T00:00:00Z",
                    "updated_at": "2021-01-01T00:00:00Z"
                })))
                .mount(&mock_server)
                .await;

            let auth = Auth::new(
                &mock_server.uri(),
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );

            let response = auth.sign_up("new@example.com", "password123").await.unwrap();
            assert_eq!(response.user().id, "new_user_id");
            assert!(response.session().is_none());
            assert!(auth.get_session().is_none());
        });
    }

    #[test]
    fn test_sign_in_rejects_bad_credentials() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/auth/v1/token"))
                .and(query_param("grant_type", "password"))
                .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": "invalid_grant",
                    "error_description": "Invalid login credentials"
                })))
                .mount(&mock_server)
                .await;

            let auth = Auth::new(
                &mock_server.uri(),
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );

            match auth.sign_in_with_password("a@b.com", "wrong").await {
                Err(AuthError::AuthenticationError(msg)) => {
                    assert_eq!(msg, "Invalid login credentials")
                }
                other => panic!("Expected AuthenticationError, got {:?}", other),
            }
            assert!(auth.get_session().is_none());
        });
    }

    #[test]
    fn test_expired_session_is_refreshed() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("POST"))
                .and(path("/auth/v1/token"))
                .and(query_param("grant_type", "refresh_token"))
                .and(body_json(serde_json::json!({ "refresh_token": "test_refresh_token" })))
                .respond_with(ResponseTemplate::new(200).set_body_json(session_body("fresh")))
                .expect(1)
                .mount(&mock_server)
                .await;

            let auth = Auth::new(
                &mock_server.uri(),
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );

            let mut stale: Session = serde_json::from_value(session_body("stale")).unwrap();
            stale.expires_at = Some(0);
            auth.set_session(stale);
            let mut events = auth.on_auth_state_change();

            let session = auth.current_session().await.unwrap().unwrap();
            assert_eq!(session.access_token, "fresh");
            assert!(!session.is_expired());
            assert_eq!(
                events.try_recv().unwrap().event,
                AuthChangeEvent::TokenRefreshed
            );
        });
    }

    #[test]
    fn test_expired_session_without_refresh_is_dropped() {
        tokio_test::block_on(async {
            let auth = Auth::new(
                "http://localhost:9",
                "test_key",
                Client::new(),
                AuthOptions {
                    auto_refresh_token: false,
                    ..Default::default()
                },
            );

            let mut stale: Session = serde_json::from_value(session_body("stale")).unwrap();
            stale.expires_at = Some(0);
            auth.set_session(stale);

            assert!(auth.current_session().await.unwrap().is_none());
            assert!(auth.get_session().is_none());
        });
    }

    #[test]
    fn test_sign_out_without_session() {
        tokio_test::block_on(async {
            let auth = Auth::new(
                "http://localhost:9",
                "test_key",
                Client::new(),
                AuthOptions::default(),
            );
            assert!(matches!(
                auth.sign_out().await,
                Err(AuthError::MissingSession)
            ));
        });
    }

    #[test]
    fn test_admin_list_users() {
        tokio_test::block_on(async {
            let mock_server = MockServer::start().await;

            Mock::given(method("GET"))
                .and(path("/auth/v1/admin/users"))
                .and(header("Authorization", "Bearer service_key"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "aud": "authenticated",
                    "users": [
                        { "id": "u1", "email": "admin@school.com" },
                        { "id": "u2", "email": "teacher@school.com" }
                    ]
                })))
                .mount(&mock_server)
                .await;

            let mut auth = Auth::new(
                &mock_server.uri(),
                "anon_key",
                Client::new(),
                AuthOptions::default(),
            );
            auth.init_admin("service_key");

            let users = auth.admin().unwrap().list_users(None, None).await.unwrap();
            assert_eq!(users.len(), 2);
            assert_eq!(users[1].email.as_deref(), Some("teacher@school.com"));
        });
    }

    #[test]
    fn comments_are_plain_english() {
        let odd: Vec<&str> = include_str!("lib.rs")
            .lines()
            .filter(|line| line.trim_start().starts_with("//") && !line.is_ascii())
            .collect();
        assert!(odd.is_empty(), "non-ASCII comments: {:?}", odd);
    }
}
