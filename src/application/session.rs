//! Browser auth client and the session state derived from it.
//!
//! Every browser owns one [`AuthClient`]. The client talks to an
//! [`AuthBackend`], remembers the current [`AuthSession`] and broadcasts each
//! sign-in or sign-out. A [`SessionProvider`] follows those broadcasts and
//! publishes a [`SessionState`] snapshot for the views.

use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "application::session";
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("auth backend request failed: {message}")]
    Backend { message: String },
}

impl AuthError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;

    async fn sign_out(&self, session: &AuthSession) -> Result<(), AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
}

pub struct AuthClient {
    backend: Arc<dyn AuthBackend>,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl AuthClient {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            session: RwLock::new(None),
            events,
        }
    }

    pub fn current_session(&self) -> Option<AuthSession> {
        rw_read(&self.session, SOURCE, "current_session").clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let session = self.backend.sign_in_with_password(email, password).await?;
        *rw_write(&self.session, SOURCE, "sign_in") = Some(session.clone());
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    /// Forget the local session. A backend failure is logged; the browser is
    /// signed out regardless.
    pub async fn sign_out(&self) {
        let previous = rw_write(&self.session, SOURCE, "sign_out").take();
        if let Some(session) = previous {
            if let Err(err) = self.backend.sign_out(&session).await {
                warn!(target = SOURCE, error = %err, "backend sign-out failed");
            }
            self.publish(AuthEvent::SignedOut);
        }
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers simply means no provider is attached yet.
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub user_id: Option<String>,
    pub loading: bool,
}

impl SessionState {
    pub fn loading() -> Self {
        Self {
            is_authenticated: false,
            user_id: None,
            loading: true,
        }
    }

    pub fn resolved(session: Option<&AuthSession>) -> Self {
        Self {
            is_authenticated: session.is_some(),
            user_id: session.map(|session| session.user_id.clone()),
            loading: false,
        }
    }
}

/// Follows one [`AuthClient`] and republishes its state. Dropping the provider
/// stops the background task.
pub struct SessionProvider {
    state: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SessionProvider {
    pub fn spawn(client: Arc<AuthClient>) -> Self {
        let (tx, rx) = watch::channel(SessionState::loading());
        let mut events = client.subscribe();

        let task = tokio::spawn(async move {
            tx.send_replace(SessionState::resolved(client.current_session().as_ref()));

            loop {
                let next = match events.recv().await {
                    Ok(AuthEvent::SignedIn(session)) => SessionState::resolved(Some(&session)),
                    Ok(AuthEvent::SignedOut) => SessionState::resolved(None),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(target = SOURCE, skipped, "session events lagged; resyncing");
                        SessionState::resolved(client.current_session().as_ref())
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                tx.send_replace(next);
            }
        });

        Self { state: rx, task }
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`, giving up after `limit`.
    pub async fn settle<F>(&self, limit: Duration, predicate: F) -> SessionState
    where
        F: Fn(&SessionState) -> bool,
    {
        let mut rx = self.state.clone();
        let waited = tokio::time::timeout(limit, async {
            rx.wait_for(|state| predicate(state))
                .await
                .map(|state| state.clone())
        })
        .await;
        match waited {
            Ok(Ok(state)) => state,
            _ => self.current(),
        }
    }
}

impl Drop for SessionProvider {
    fn drop(&mut self) {
        self.task.abort();
    }
}
