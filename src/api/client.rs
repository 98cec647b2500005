//! API client for the Miqat backend.
//!
//! `AuthClient` is both the typed gateway (register, login, current
//! user, settings) and the credential injector: before every send it
//! reads the bearer token from the credential store and attaches it
//! when present, and on every 401 it purges the store, publishes a
//! `SessionEvent::Unauthorized`, and re-raises the error. It holds no
//! session state of its own; that belongs to the `SessionManager`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::auth::{CredentialStore, SessionEvent};
use crate::models::{User, UserSettings};

use super::AuthError;

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile networks while failing fast enough for
/// a usable login screen.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Successful register/login response body.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    pub access_token: String,
    pub user: User,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Response wrapper for endpoints returning `{ "user": ... }`.
#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: User,
}

/// API client for the Miqat backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection
/// pooling, and the store clone is a path.
#[derive(Clone)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    store: CredentialStore,
    events: mpsc::Sender<SessionEvent>,
}

impl AuthClient {
    /// Create a client against `base_url` (e.g. `http://host:5000/api`),
    /// injecting credentials from `store` and publishing 401 events on
    /// `events`.
    pub fn new(
        base_url: impl Into<String>,
        store: CredentialStore,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            store,
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ===== Auth operations =====

    /// Register a new account. Fails with `Validation` on
    /// malformed/duplicate input as reported by the server.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthPayload, AuthError> {
        let body = RegisterRequest {
            email,
            username,
            password,
        };
        self.execute(self.http.post(self.url("/auth/register")).json(&body))
            .await
    }

    /// Exchange credentials for a bearer token. A 401 here means the
    /// credentials were wrong, so the injector's `Unauthorized` is
    /// remapped to `InvalidCredentials` carrying the server message.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, AuthError> {
        let body = LoginRequest { email, password };
        match self
            .execute(self.http.post(self.url("/auth/login")).json(&body))
            .await
        {
            Err(AuthError::Unauthorized(message)) => Err(AuthError::InvalidCredentials(message)),
            other => other,
        }
    }

    /// Identity check: ask the server who the attached token belongs
    /// to. Fails with `Unauthorized` when the token is invalid or
    /// expired.
    pub async fn current_user(&self) -> Result<User, AuthError> {
        let envelope: UserEnvelope = self.execute(self.http.get(self.url("/auth/me"))).await?;
        Ok(envelope.user)
    }

    /// Update account settings, returning the refreshed user record.
    pub async fn update_settings(&self, settings: &UserSettings) -> Result<User, AuthError> {
        let envelope: UserEnvelope = self
            .execute(self.http.put(self.url("/users/settings")).json(settings))
            .await?;
        Ok(envelope.user)
    }

    // ===== Credential injection pipeline =====

    /// Send one request through the injector: attach the cached bearer
    /// token when present, and on a 401 purge the store and publish a
    /// session event before re-raising. No retries at this layer.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AuthError> {
        let request = match self.store.token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&body)
                .map_err(|e| AuthError::InvalidResponse(format!("{} (status {})", e, status)))
        } else {
            if status == StatusCode::UNAUTHORIZED {
                self.handle_unauthorized().await;
            }
            Err(AuthError::from_status(status, &body))
        }
    }

    /// 401 side effects: drop the durable credentials and tell the
    /// session manager. The in-memory session is not touched here; the
    /// manager collapses it when it drains the event.
    async fn handle_unauthorized(&self) {
        debug!("Request rejected with 401; purging stored credentials");
        if let Err(e) = self.store.purge().await {
            warn!(error = %e, "Failed to purge credential store after 401");
        }
        if let Err(e) = self.events.try_send(SessionEvent::Unauthorized) {
            debug!(error = %e, "Session event not delivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::tests::{sample_user, temp_store};
    use mockito::Matcher;

    async fn client_with_store(
        base_url: &str,
        store: &CredentialStore,
    ) -> (AuthClient, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let client = AuthClient::new(base_url, store.clone(), tx).unwrap();
        (client, rx)
    }

    fn auth_payload_json() -> String {
        serde_json::json!({
            "message": "Login successful",
            "access_token": "tok-abc",
            "user": sample_user(),
        })
        .to_string()
    }

    #[tokio::test]
    async fn login_sends_unauthenticated_when_no_token_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/login")
            .match_header("authorization", Matcher::Missing)
            .match_body(Matcher::Json(serde_json::json!({
                "email": "amina@example.com",
                "password": "hunter2",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(auth_payload_json())
            .create_async()
            .await;

        let store = temp_store("login-ok").await;
        let (client, _rx) = client_with_store(&server.url(), &store).await;

        let payload = client.login("amina@example.com", "hunter2").await.unwrap();
        assert_eq!(payload.access_token, "tok-abc");
        assert_eq!(payload.user, sample_user());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn login_rejection_maps_to_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/login")
            .with_status(401)
            .with_body(r#"{"error": "Invalid email or password"}"#)
            .create_async()
            .await;

        let store = temp_store("login-401").await;
        let (client, _rx) = client_with_store(&server.url(), &store).await;

        let err = client.login("amina@example.com", "wrong").await.unwrap_err();
        match err {
            AuthError::InvalidCredentials(msg) => assert_eq!(msg, "Invalid email or password"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn current_user_attaches_cached_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/me")
            .match_header("authorization", "Bearer tok-123")
            .with_status(200)
            .with_body(serde_json::json!({ "user": sample_user() }).to_string())
            .create_async()
            .await;

        let store = temp_store("me").await;
        store.set_token("tok-123").await.unwrap();
        let (client, _rx) = client_with_store(&server.url(), &store).await;

        let user = client.current_user().await.unwrap();
        assert_eq!(user, sample_user());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_response_purges_store_and_publishes_event() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/auth/me")
            .with_status(401)
            .with_body(r#"{"error": "Token has expired"}"#)
            .create_async()
            .await;

        let store = temp_store("me-401").await;
        store.set_token("tok-stale").await.unwrap();
        store.set_user(&sample_user()).await.unwrap();
        let (client, mut rx) = client_with_store(&server.url(), &store).await;

        let err = client.current_user().await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(_)));

        assert_eq!(store.token().await.unwrap(), None);
        assert_eq!(store.user().await.unwrap(), None);
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::Unauthorized)));
    }

    #[tokio::test]
    async fn update_settings_puts_through_injector() {
        let mut refreshed = sample_user();
        refreshed.calculation_method = Some("MWL".to_string());

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/users/settings")
            .match_header("authorization", "Bearer tok-123")
            .match_body(Matcher::Json(serde_json::json!({
                "calculation_method": "MWL",
            })))
            .with_status(200)
            .with_body(serde_json::json!({ "user": refreshed }).to_string())
            .create_async()
            .await;

        let store = temp_store("settings").await;
        store.set_token("tok-123").await.unwrap();
        let (client, _rx) = client_with_store(&server.url(), &store).await;

        let settings = UserSettings {
            calculation_method: Some("MWL".to_string()),
            ..Default::default()
        };
        let user = client.update_settings(&settings).await.unwrap();
        assert_eq!(user.calculation_method.as_deref(), Some("MWL"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn register_surfaces_validation_details() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/auth/register")
            .with_status(400)
            .with_body(r#"{"error": "Validation failed", "details": {"password": ["Shorter than minimum length 8."]}}"#)
            .create_async()
            .await;

        let store = temp_store("register-400").await;
        let (client, _rx) = client_with_store(&server.url(), &store).await;

        let err = client
            .register("amina@example.com", "amina", "short")
            .await
            .unwrap_err();
        match err {
            AuthError::Validation(msg) => assert!(msg.contains("Shorter than minimum length 8.")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
