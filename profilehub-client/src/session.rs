/// Session state shared across an application
///
/// A [`SessionContext`] is a cheap, cloneable handle. Every clone sees the
/// same state, and anything interested in sign-in changes calls
/// [`SessionContext::subscribe`] and awaits `changed()` on the receiver
/// instead of polling.
///
/// ```text
///              sign_in                invalidate (401)
/// Anonymous ───────────► Authenticated ───────────────► Expired
///     ▲                       │                            │
///     └──── sign_out ─────────┴──────── sign_out ──────────┘
/// ```
///
/// `sign_in` is accepted from any state.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// Tokens for a signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Session),
    /// The server rejected the tokens; the user has to sign in again
    Expired,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    tx: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Anonymous);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, session: Session) {
        debug!(user_id = %session.user_id, "Session signed in");
        self.tx.send_replace(SessionState::Authenticated(session));
    }

    pub fn sign_out(&self) {
        self.tx.send_if_modified(|state| {
            let changed = *state != SessionState::Anonymous;
            *state = SessionState::Anonymous;
            changed
        });
    }

    /// Marks an authenticated session as expired. No effect otherwise.
    pub fn invalidate(&self) {
        self.tx.send_if_modified(|state| match state {
            SessionState::Authenticated(session) => {
                debug!(user_id = %session.user_id, "Session expired");
                *state = SessionState::Expired;
                true
            }
            _ => false,
        });
    }

    /// Swaps in a fresh access token, keeping the rest of the session.
    pub fn update_access_token(&self, access_token: String) {
        self.tx.send_if_modified(|state| match state {
            SessionState::Authenticated(session) => {
                session.access_token = access_token;
                true
            }
            _ => false,
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.tx.borrow(), SessionState::Authenticated(_))
    }

    pub fn access_token(&self) -> Option<String> {
        match &*self.tx.borrow() {
            SessionState::Authenticated(session) => Some(session.access_token.clone()),
            _ => None,
        }
    }

    pub fn refresh_token(&self) -> Option<String> {
        match &*self.tx.borrow() {
            SessionState::Authenticated(session) => Some(session.refresh_token.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            user_id: Uuid::new_v4(),
            access_token: "access-1".into(),
            refresh_token: "refresh-1".into(),
        }
    }

    #[test]
    fn test_starts_anonymous() {
        let ctx = SessionContext::new();
        assert_eq!(ctx.state(), SessionState::Anonymous);
        assert!(ctx.access_token().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let ctx = SessionContext::new();
        let other = ctx.clone();

        ctx.sign_in(session());
        assert!(other.is_authenticated());
        assert_eq!(other.access_token().as_deref(), Some("access-1"));

        other.sign_out();
        assert!(!ctx.is_authenticated());
    }

    #[test]
    fn test_invalidate_only_affects_signed_in_sessions() {
        let ctx = SessionContext::new();
        ctx.invalidate();
        assert_eq!(ctx.state(), SessionState::Anonymous);

        ctx.sign_in(session());
        ctx.invalidate();
        assert_eq!(ctx.state(), SessionState::Expired);
        assert!(ctx.refresh_token().is_none());
    }

    #[test]
    fn test_update_access_token() {
        let ctx = SessionContext::new();
        ctx.sign_in(session());
        ctx.update_access_token("access-2".into());

        assert_eq!(ctx.access_token().as_deref(), Some("access-2"));
        assert_eq!(ctx.refresh_token().as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_subscribers_are_notified_of_expiry() {
        let ctx = SessionContext::new();
        ctx.sign_in(session());

        let mut rx = ctx.subscribe();
        let observer = tokio::spawn(async move {
            rx.changed().await.unwrap();
            rx.borrow().clone()
        });

        ctx.invalidate();
        assert_eq!(observer.await.unwrap(), SessionState::Expired);
    }

    #[tokio::test]
    async fn test_no_notification_when_nothing_changes() {
        let ctx = SessionContext::new();
        let rx = ctx.subscribe();

        ctx.sign_out();
        ctx.invalidate();

        assert!(!rx.has_changed().unwrap());
    }
}
