//! Registry of live WebSocket sessions.
//!
//! A session is inserted when the socket is upgraded and removed when it
//! closes. Authentication is a flag on the session plus the cancellation
//! token of its push loop; revoking or closing cancels the token so the loop
//! and any frame it has already queued are dropped.

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub type SessionId = String;

/// Per-connection state tracked by the registry.
#[derive(Debug)]
pub struct SessionInfo {
    pub created_at: Instant,
    /// Present exactly while the session is authenticated.
    push: Option<CancellationToken>,
}

impl SessionInfo {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            push: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.push.is_some()
    }

    fn revoke(&mut self) -> bool {
        match self.push.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new unauthenticated session and returns its id.
    pub async fn open(&self) -> SessionId {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().await;
        sessions.insert(id.clone(), SessionInfo::new());
        log::debug!("Session {} opened - active sessions: {}", id, sessions.len());
        id
    }

    /// Marks the session authenticated and hands out the token for its push loop.
    ///
    /// A previous token is cancelled first, so at most one loop runs per
    /// session. Returns `None` if the session is already gone.
    pub async fn grant(&self, id: &str) -> Option<CancellationToken> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(id)?;
        session.revoke();
        let token = CancellationToken::new();
        session.push = Some(token.clone());
        Some(token)
    }

    /// Clears authentication and stops the push loop. Returns whether it was authenticated.
    pub async fn revoke(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(id).map(SessionInfo::revoke).unwrap_or(false)
    }

    /// Removes the session, cancelling its push loop unconditionally.
    pub async fn close(&self, id: &str) {
        let mut sessions = self.sessions.lock().await;
        if let Some(mut session) = sessions.remove(id) {
            session.revoke();
            log::debug!(
                "Session {} closed after {:?} - remaining sessions: {}",
                id,
                session.created_at.elapsed(),
                sessions.len()
            );
        }
    }

    pub async fn is_authenticated(&self, id: &str) -> bool {
        self.sessions
            .lock()
            .await
            .get(id)
            .is_some_and(SessionInfo::is_authenticated)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|s| s.is_authenticated())
            .count()
    }
}
