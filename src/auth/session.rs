//! Session state machine.
//!
//! `SessionManager` owns the in-memory session exclusively; every
//! mutation goes through its operations (startup, login, register,
//! logout, clear_error), which serialize on one async mutex so two
//! session-mutating calls can never race each other or the credential
//! store. UI layers observe the session through `SessionSnapshot`
//! values, either pulled with `snapshot()` or streamed over a watch
//! channel.
//!
//! The injector's 401 side channel arrives here as `SessionEvent`s on
//! an mpsc queue; the queue is drained at the start and end of every
//! operation and on every snapshot read, so a server-side invalidation
//! collapses the in-memory session no later than the next read.

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::{AuthClient, AuthError, AuthPayload};
use crate::auth::CredentialStore;
use crate::models::{User, UserSettings};

/// Buffer size for the injector-to-manager event channel.
/// 401s are rare and the queue is drained on every operation, so a
/// small buffer is plenty.
const EVENT_CHANNEL_SIZE: usize = 8;

/// Event published by the request pipeline when the server rejects the
/// attached token. By the time this is observed the store has already
/// been purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Unauthorized,
}

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Before the startup check has completed.
    Unknown,
    Unauthenticated,
    Authenticated(User),
}

/// Result of the startup session check. Expired or rejected cached
/// sessions are a routine outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// No stored token/user; nothing was sent over the network.
    NoSession,
    /// The cached session was confirmed; carries the server's
    /// authoritative user record.
    Verified(User),
    /// The cached session was rejected or unverifiable; the store has
    /// been purged.
    Invalidated,
}

/// Read-only view of the session for UI layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl SessionSnapshot {
    /// State before the startup check has run.
    fn initial() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            is_loading: true,
            error: None,
        }
    }
}

struct SessionInner {
    state: AuthState,
    error: Option<String>,
    loading: bool,
    events: mpsc::Receiver<SessionEvent>,
}

/// Orchestrates the authentication lifecycle.
pub struct SessionManager {
    store: CredentialStore,
    client: AuthClient,
    /// Held across each operation's awaits; this is the serialization
    /// point for every session-mutating call.
    inner: Mutex<SessionInner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl SessionManager {
    pub fn new(
        api_base_url: impl Into<String>,
        store: CredentialStore,
    ) -> Result<Self, AuthError> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let client = AuthClient::new(api_base_url, store.clone(), events_tx)?;
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::initial());

        Ok(Self {
            store,
            client,
            inner: Mutex::new(SessionInner {
                state: AuthState::Unknown,
                error: None,
                loading: true,
                events: events_rx,
            }),
            snapshot_tx,
        })
    }

    /// The underlying API client, for requests beyond the session
    /// operations. Calls made through it still pass the injector.
    pub fn client(&self) -> &AuthClient {
        &self.client
    }

    /// Subscribe to session snapshots. The current value is available
    /// immediately; a new one is published after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current session view, after reconciling any pending 401 events.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);
        self.publish(&inner)
    }

    /// Drain pending injector events without running an operation.
    /// Intended for UI poll loops.
    pub async fn reconcile(&self) {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);
        self.publish(&inner);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Restore the session from the credential store, then verify it
    /// against the server.
    ///
    /// A cached token/user pair is trusted optimistically (the session
    /// reads as authenticated while the identity check is in flight),
    /// then replaced with the server's answer. Verification failure is
    /// a routine outcome for an expired session: the store is purged
    /// and the session lands unauthenticated with no error surfaced.
    /// Store-read failures are logged and treated as "no session".
    pub async fn startup(&self) -> StartupOutcome {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);
        inner.loading = true;
        self.publish(&inner);

        let token = self.store.token().await.unwrap_or_else(|e| {
            warn!(error = %e, "Credential store unreadable at startup; treating as no session");
            None
        });
        let cached_user = self.store.user().await.unwrap_or_else(|e| {
            warn!(error = %e, "Stored user unreadable at startup; treating as no session");
            None
        });

        let outcome = match (token, cached_user) {
            (Some(_), Some(cached)) => {
                // Optimistic window: trust the cache while the identity
                // check is in flight.
                inner.state = AuthState::Authenticated(cached);
                self.publish(&inner);

                match self.client.current_user().await {
                    Ok(fresh) => {
                        debug!(username = %fresh.username, "Cached session verified");
                        inner.state = AuthState::Authenticated(fresh.clone());
                        StartupOutcome::Verified(fresh)
                    }
                    Err(e) => {
                        // Expected for an expired session; recovered
                        // locally rather than surfaced.
                        info!(error = %e, "Cached session rejected; clearing credentials");
                        if let Err(e) = self.store.purge().await {
                            warn!(error = %e, "Failed to purge credential store");
                        }
                        inner.state = AuthState::Unauthenticated;
                        StartupOutcome::Invalidated
                    }
                }
            }
            _ => {
                debug!("No stored session");
                inner.state = AuthState::Unauthenticated;
                StartupOutcome::NoSession
            }
        };

        self.finish_operation(&mut inner);
        outcome
    }

    /// Log in with email and password.
    ///
    /// Empty input short-circuits with a validation error before any
    /// network traffic. On success the token is persisted, then the
    /// user, then the in-memory session flips to authenticated - in
    /// that order, so observers never see memory ahead of the store.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);

        if email.trim().is_empty() || password.is_empty() {
            let message = "Email and password are required".to_string();
            inner.error = Some(message.clone());
            self.publish(&inner);
            return Err(AuthError::Validation(message));
        }

        inner.loading = true;
        inner.error = None;
        self.publish(&inner);

        let result = self.client.login(email.trim(), password).await;
        let outcome = self.apply_auth_result(&mut inner, result).await;

        self.finish_operation(&mut inner);
        outcome
    }

    /// Register a new account. Input validation beyond presence is the
    /// server's job; its messages come back through the error slot.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);
        inner.loading = true;
        inner.error = None;
        self.publish(&inner);

        let result = self
            .client
            .register(email.trim(), username.trim(), password)
            .await;
        let outcome = self.apply_auth_result(&mut inner, result).await;

        self.finish_operation(&mut inner);
        outcome
    }

    /// Tear down the session. Always succeeds from the caller's
    /// perspective; a store purge failure is logged, not surfaced.
    /// Idempotent from any state.
    pub async fn logout(&self) {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);

        if let Err(e) = self.store.purge().await {
            warn!(error = %e, "Failed to purge credential store at logout");
        }
        inner.state = AuthState::Unauthenticated;
        self.publish(&inner);
    }

    /// Reset the readable error slot without touching session state.
    pub async fn clear_error(&self) {
        let mut inner = self.inner.lock().await;
        inner.error = None;
        self.publish(&inner);
    }

    /// Update account settings; the returned user record replaces both
    /// the stored and in-memory copies wholesale.
    pub async fn update_settings(&self, settings: &UserSettings) -> Result<User, AuthError> {
        let mut inner = self.inner.lock().await;
        self.drain_events(&mut inner);
        inner.loading = true;
        inner.error = None;
        self.publish(&inner);

        let outcome = match self.client.update_settings(settings).await {
            Ok(user) => {
                if let Err(e) = self.store.set_user(&user).await {
                    warn!(error = %e, "Failed to persist updated user record");
                }
                if matches!(inner.state, AuthState::Authenticated(_)) {
                    inner.state = AuthState::Authenticated(user.clone());
                }
                Ok(user)
            }
            Err(e) => {
                inner.error = Some(e.to_string());
                Err(e)
            }
        };

        self.finish_operation(&mut inner);
        outcome
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Shared tail of login/register: persist and adopt the session on
    /// success, record and re-raise the failure otherwise.
    async fn apply_auth_result(
        &self,
        inner: &mut SessionInner,
        result: Result<AuthPayload, AuthError>,
    ) -> Result<User, AuthError> {
        match result {
            Ok(payload) => {
                // Token happens-before user, both happen-before the
                // in-memory update.
                if let Err(e) = self.persist_payload(&payload).await {
                    inner.state = AuthState::Unauthenticated;
                    inner.error = Some(e.to_string());
                    return Err(e);
                }
                inner.state = AuthState::Authenticated(payload.user.clone());
                Ok(payload.user)
            }
            Err(e) => {
                inner.state = AuthState::Unauthenticated;
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn persist_payload(&self, payload: &AuthPayload) -> Result<(), AuthError> {
        self.store.set_token(&payload.access_token).await?;
        self.store.set_user(&payload.user).await?;
        Ok(())
    }

    /// Drain the injector's event queue, collapsing a stale
    /// authenticated state if the server has invalidated the token.
    /// Silent: an expired session is expected, not a fault.
    fn drain_events(&self, inner: &mut SessionInner) {
        while let Ok(event) = inner.events.try_recv() {
            match event {
                SessionEvent::Unauthorized => {
                    if matches!(inner.state, AuthState::Authenticated(_)) {
                        info!("Server invalidated the session; dropping in-memory state");
                        inner.state = AuthState::Unauthenticated;
                    }
                }
            }
        }
    }

    /// Common operation epilogue: reconcile events raised during the
    /// operation, clear the in-flight flag, publish.
    fn finish_operation(&self, inner: &mut SessionInner) {
        self.drain_events(inner);
        inner.loading = false;
        self.publish(inner);
    }

    fn publish(&self, inner: &SessionInner) -> SessionSnapshot {
        let snapshot = SessionSnapshot {
            user: match &inner.state {
                AuthState::Authenticated(user) => Some(user.clone()),
                _ => None,
            },
            is_authenticated: matches!(inner.state, AuthState::Authenticated(_)),
            is_loading: inner.loading,
            error: inner.error.clone(),
        };
        let _ = self.snapshot_tx.send(snapshot.clone());
        snapshot
    }
}
