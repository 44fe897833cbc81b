use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Credential handed out by the auth collaborator.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    token: String,
}

impl AuthSession {
    /// Wraps a bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Bearer token attached to the outbound request.
    pub fn token(&self) -> &str {
        &self.token
    }

    fn is_usable(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Read-only view of the auth collaborator.
///
/// The coordinator reads the active session once per run and never mutates it.
#[async_trait::async_trait]
pub trait SessionSource: Send + Sync {
    /// Returns the active session, if any.
    async fn active_session(&self) -> Option<AuthSession>;
}

/// In-memory session holder that notifies subscribers on sign-in and sign-out.
#[derive(Clone)]
pub struct SessionStore {
    tx: Arc<watch::Sender<Option<AuthSession>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds a session for `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(AuthSession::new(token));
        store
    }

    /// Replaces the active session. Blank tokens clear it.
    pub fn set(&self, session: AuthSession) {
        let next = Some(session).filter(AuthSession::is_usable);
        self.tx.send_replace(next);
    }

    /// Signs out.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Returns the current session without waiting.
    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    /// Subscribes to session changes; the receiver sees every later `set`/`clear`.
    pub fn on_session_change(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

#[async_trait::async_trait]
impl SessionSource for SessionStore {
    async fn active_session(&self) -> Option<AuthSession> {
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_token_counts_as_signed_out() {
        let store = SessionStore::with_token("  ");
        assert_eq!(store.active_session().await, None);
    }

    #[tokio::test]
    async fn subscribers_observe_sign_out() {
        let store = SessionStore::with_token("abc");
        let mut rx = store.on_session_change();
        assert_eq!(rx.borrow().as_ref().map(AuthSession::token), Some("abc"));

        store.clear();
        rx.changed().await.expect("sender alive");
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn debug_output_hides_token() {
        let rendered = format!("{:?}", AuthSession::new("secret-token"));
        assert!(!rendered.contains("secret-token"));
    }
}
