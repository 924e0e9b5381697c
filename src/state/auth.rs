//! Auth-session state for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! `AuthSession` is constructed once at application start and handed to
//! consumers by reference or clone. It keeps the in-memory [`AuthState`],
//! session storage, and the client's default credential in step, and
//! publishes every state change on a `watch` channel for views to re-render.
//!
//! CONCURRENCY
//! ===========
//! `login`, `logout`, `update_user`, and `refresh_user` queue on one async
//! mutex, so overlapping calls apply in arrival order instead of
//! interleaving their storage writes. Dropping an in-flight `login` or
//! `refresh_user` future cancels it before any mutation. `logout` clears
//! the session before it releases the mutex and only then waits on the
//! server notification, so a slow `/logout` never holds up local cleanup
//! or the queued operations behind it.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::net::api;
use crate::net::client::ApiClient;
use crate::net::types::{SessionError, User, UserPatch};

/// Coarse session category derived from [`AuthState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Authentication state tracking the token, the cached user, and loading status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub token: Option<String>,
    pub user: Option<User>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::loading()
    }
}

impl AuthState {
    #[must_use]
    pub fn loading() -> Self {
        Self { token: None, user: None, loading: true }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { token: None, user: None, loading: false }
    }

    #[must_use]
    pub fn authenticated(token: String, user: User) -> Self {
        Self { token: Some(token), user: Some(user), loading: false }
    }

    /// True exactly when a token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    #[must_use]
    pub fn status(&self) -> AuthStatus {
        if self.loading {
            AuthStatus::Loading
        } else if self.is_authenticated() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Unauthenticated
        }
    }
}

/// Process-wide authentication context.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<Inner>,
}

struct Inner {
    client: ApiClient,
    state: watch::Sender<AuthState>,
    ops: Mutex<()>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession").field("status", &self.state().status()).finish_non_exhaustive()
    }
}

impl AuthSession {
    /// A session in the `Loading` state. Call [`Self::load`] to resolve it.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(AuthState::loading());
        Self { inner: Arc::new(Inner { client, state, ops: Mutex::new(()) }) }
    }

    /// Construct and immediately resolve from storage, without network calls.
    #[must_use]
    pub fn mount(client: ApiClient) -> Self {
        let session = Self::new(client);
        session.load();
        session
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.inner.client
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.state.borrow().user.clone()
    }

    /// Receiver notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Resolve state from storage: authenticated only if both token and user are stored.
    pub fn load(&self) -> AuthStatus {
        let storage = self.inner.client.storage();
        let next = match (storage.token(), storage.user()) {
            (Some(token), Some(user)) => {
                self.inner.client.set_default_token(Some(token.clone()));
                tracing::debug!(user_id = user.id, "restored session from storage");
                AuthState::authenticated(token, user)
            }
            _ => AuthState::unauthenticated(),
        };
        let status = next.status();
        self.inner.state.send_replace(next);
        status
    }

    /// Re-read storage, e.g. after a 401 elsewhere cleared it.
    pub async fn reload(&self) -> AuthStatus {
        let _op = self.inner.ops.lock().await;
        self.load()
    }

    /// Exchange credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns the request error as-is, or [`SessionError::IncompleteLogin`]
    /// when the response lacks a token or user. State is untouched on error.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let _op = self.inner.ops.lock().await;
        let response = api::login(&self.inner.client, email, password).await.inspect_err(|err| {
            tracing::info!(error = %err, "login rejected");
        })?;
        let (token, user) = response.into_credentials().ok_or(SessionError::IncompleteLogin)?;

        let storage = self.inner.client.storage();
        if let Err(err) = storage.set_token(Some(&token)).and_then(|()| storage.set_user(Some(&user))) {
            storage.clear_best_effort();
            return Err(err.into());
        }
        self.inner.client.set_default_token(Some(token.clone()));
        self.inner.state.send_replace(AuthState::authenticated(token, user.clone()));
        tracing::info!(user_id = user.id, role = %user.role, "login succeeded");
        Ok(user)
    }

    /// End the session. Local state is cleared as soon as the server
    /// notification is dispatched; server errors are only logged.
    pub async fn logout(&self) {
        let notification = {
            let _op = self.inner.ops.lock().await;
            let notification = self.inner.client.spawn_logout_notification();
            self.clear_local();
            notification
        };
        if let Err(err) = notification.await {
            tracing::warn!(error = %err, "server logout task did not complete");
        }
    }

    /// Merge `patch` into the cached profile and persist it. No request is made.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] unless authenticated with a
    /// cached user, or a storage error if persisting fails.
    pub async fn update_user(&self, patch: &UserPatch) -> Result<User, SessionError> {
        let _op = self.inner.ops.lock().await;
        let current = self.inner.state.borrow().clone();
        let (Some(_), Some(user)) = (current.token, current.user) else {
            return Err(SessionError::NotAuthenticated);
        };
        let merged = user.merged(patch);
        self.inner.client.storage().set_user(Some(&merged))?;
        self.inner.state.send_modify(|state| state.user = Some(merged.clone()));
        Ok(merged)
    }

    /// Replace the cached profile with the server's copy from `GET /user`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotAuthenticated`] without a session, or the
    /// request error. A 401 also drops the in-memory session.
    pub async fn refresh_user(&self) -> Result<User, SessionError> {
        let _op = self.inner.ops.lock().await;
        if !self.is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        match api::fetch_current_user(&self.inner.client).await {
            Ok(user) => {
                self.inner.client.storage().set_user(Some(&user))?;
                self.inner.state.send_modify(|state| state.user = Some(user.clone()));
                Ok(user)
            }
            Err(err) => {
                if err.is_unauthorized() {
                    self.inner.state.send_replace(AuthState::unauthenticated());
                }
                Err(err.into())
            }
        }
    }

    fn clear_local(&self) {
        self.inner.client.storage().clear_best_effort();
        self.inner.client.set_default_token(None);
        self.inner.state.send_replace(AuthState::unauthenticated());
        tracing::info!("session cleared");
    }
}
