//! Per-chat session state.
//!
//! One in-flight request per chat. The dispatch layer owns this map; the
//! normalizer/ranker stay stateless. Cancellation is cooperative: /stop
//! flips a flag that long-running flows check between tracks.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

/// What a chat is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionMode {
    #[default]
    Idle,
    /// Free-text search in flight.
    Search,
    /// Single-track download in flight.
    Single,
    /// Playlist expansion/download in flight.
    Playlist,
}

/// Shared cancellation flag for one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Session {
    mode: SessionMode,
    cancel: CancelToken,
}

/// Session map keyed by chat id.
#[derive(Default)]
pub struct Sessions {
    inner: Mutex<HashMap<i64, Session>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for a chat. Returns None when one is already in
    /// flight there.
    pub async fn begin(&self, chat_id: i64, mode: SessionMode) -> Option<CancelToken> {
        let mut inner = self.inner.lock().await;
        if inner.get(&chat_id).is_some_and(|s| s.mode != SessionMode::Idle) {
            return None;
        }
        let cancel = CancelToken::default();
        inner.insert(
            chat_id,
            Session {
                mode,
                cancel: cancel.clone(),
            },
        );
        Some(cancel)
    }

    /// Mark a chat idle again.
    pub async fn finish(&self, chat_id: i64) {
        self.inner.lock().await.remove(&chat_id);
    }

    /// Request cancellation of the chat's in-flight request. Returns
    /// the mode that was cancelled, or None when nothing is running,
    /// so the caller can word its reply per mode.
    pub async fn cancel(&self, chat_id: i64) -> Option<SessionMode> {
        let inner = self.inner.lock().await;
        match inner.get(&chat_id) {
            Some(session) if session.mode != SessionMode::Idle => {
                session.cancel.cancel();
                Some(session.mode)
            }
            _ => None,
        }
    }

    pub async fn mode(&self, chat_id: i64) -> SessionMode {
        self.inner
            .lock()
            .await
            .get(&chat_id)
            .map(|s| s.mode)
            .unwrap_or_default()
    }

    /// Number of chats with a request in flight (for /status).
    pub async fn active_count(&self) -> usize {
        self.inner
            .lock()
            .await
            .values()
            .filter(|s| s.mode != SessionMode::Idle)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_refuses_second_request() {
        let sessions = Sessions::new();
        assert!(sessions.begin(1, SessionMode::Single).await.is_some());
        assert!(sessions.begin(1, SessionMode::Search).await.is_none());
        // Another chat is unaffected.
        assert!(sessions.begin(2, SessionMode::Search).await.is_some());
    }

    #[tokio::test]
    async fn test_finish_makes_chat_idle() {
        let sessions = Sessions::new();
        sessions.begin(1, SessionMode::Playlist).await.unwrap();
        assert_eq!(sessions.mode(1).await, SessionMode::Playlist);
        sessions.finish(1).await;
        assert_eq!(sessions.mode(1).await, SessionMode::Idle);
        assert!(sessions.begin(1, SessionMode::Single).await.is_some());
    }

    #[tokio::test]
    async fn test_cancel_sets_token() {
        let sessions = Sessions::new();
        let token = sessions.begin(1, SessionMode::Playlist).await.unwrap();
        assert!(!token.is_cancelled());
        assert_eq!(sessions.cancel(1).await, Some(SessionMode::Playlist));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_reports_mode() {
        // /stop words its reply differently for playlists, which stop
        // between tracks, and single downloads, which run to the end.
        let sessions = Sessions::new();
        sessions.begin(1, SessionMode::Single).await.unwrap();
        assert_eq!(sessions.cancel(1).await, Some(SessionMode::Single));
        sessions.finish(1).await;
        sessions.begin(1, SessionMode::Search).await.unwrap();
        assert_eq!(sessions.cancel(1).await, Some(SessionMode::Search));
    }

    #[tokio::test]
    async fn test_cancel_idle_chat_is_noop() {
        let sessions = Sessions::new();
        assert_eq!(sessions.cancel(42).await, None);
    }

    #[tokio::test]
    async fn test_active_count() {
        let sessions = Sessions::new();
        assert_eq!(sessions.active_count().await, 0);
        sessions.begin(1, SessionMode::Single).await.unwrap();
        sessions.begin(2, SessionMode::Search).await.unwrap();
        assert_eq!(sessions.active_count().await, 2);
        sessions.finish(1).await;
        assert_eq!(sessions.active_count().await, 1);
    }
}
