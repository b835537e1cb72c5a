//! In-process session store.
//!
//! Sessions vanish with the process. Useful for single-node deployments and
//! tests; the SQLite store in [`super::store`] is the durable option.

use super::token::SessionToken;
use super::traits::SessionStore;
use crate::error::{AuthError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// `HashMap`-backed [`SessionStore`]. Get-and-delete is a single `remove`
/// under the lock, so concurrent logouts see each entry at most once.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionToken, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Snapshot of the stored tokens.
    pub fn tokens(&self) -> Vec<SessionToken> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Drop every session belonging to `user_id`. Returns how many were removed.
    pub fn revoke_all_sessions(&self, user_id: &str) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, owner| owner != user_id);
        before - sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, token: &SessionToken, user_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(token) {
            return Err(AuthError::internal_msg(
                "insert session",
                "session token already stored",
            ));
        }
        sessions.insert(token.clone(), user_id.to_string());
        Ok(())
    }

    async fn get_and_delete(&self, token: &SessionToken) -> Result<String> {
        self.sessions
            .lock()
            .remove(token)
            .ok_or_else(|| AuthError::not_found("delete session", "session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_and_delete_once() {
        let store = MemorySessionStore::new();
        let token = SessionToken::new("tok-1");
        store.put(&token, "u1").await.unwrap();
        assert_eq!(store.len(), 1);

        assert_eq!(store.get_and_delete(&token).await.unwrap(), "u1");
        assert!(store.is_empty());
        assert!(store.get_and_delete(&token).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn duplicate_put_is_rejected() {
        let store = MemorySessionStore::new();
        let token = SessionToken::new("tok-1");
        store.put(&token, "u1").await.unwrap();
        assert!(store.put(&token, "u2").await.is_err());
        assert_eq!(store.get_and_delete(&token).await.unwrap(), "u1");
    }

    #[tokio::test]
    async fn revoke_all_only_touches_one_user() {
        let store = MemorySessionStore::new();
        store.put(&SessionToken::new("a"), "u1").await.unwrap();
        store.put(&SessionToken::new("b"), "u1").await.unwrap();
        store.put(&SessionToken::new("c"), "u2").await.unwrap();

        assert_eq!(store.revoke_all_sessions("u1"), 2);
        assert_eq!(store.tokens(), vec![SessionToken::new("c")]);
    }
}
