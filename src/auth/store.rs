//! SQLite-backed credential and session store.
//!
//! Tables:
//! - `users`: id, username (case-sensitive, unique), password_hash, created_at
//! - `sessions`: token_hash, user_id, created_at, expires_at
//!
//! Session tokens are stored as their SHA-256 digest; the plaintext token
//! only ever lives with the client. All access goes through one connection
//! behind a mutex, and the blocking SQLite calls run on the blocking pool.

use super::password::{self, DEFAULT_HASH_ROUNDS};
use super::token::SessionToken;
use super::traits::{CredentialStore, IdentityRecord, SessionStore};
use crate::error::{AuthError, Result};
use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest accepted username.
const MAX_USERNAME_LEN: usize = 64;

/// Shortest accepted password.
const MIN_PASSWORD_LEN: usize = 8;

/// SQLite authentication store implementing both [`CredentialStore`] and
/// [`SessionStore`].
pub struct SqliteAuthStore {
    conn: Arc<Mutex<Connection>>,
    session_ttl_secs: Option<u64>,
    hash_rounds: u32,
}

impl SqliteAuthStore {
    /// Open (or create) the auth database at the given path.
    ///
    /// With `session_ttl_secs` set, sessions older than the TTL are treated
    /// as absent and can be swept with [`Self::cleanup_expired_sessions`].
    pub fn new(db_path: &Path, session_ttl_secs: Option<u64>) -> anyhow::Result<Self> {
        let conn = Connection::open(db_path)?;

        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token_hash TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at INTEGER NOT NULL,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);",
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            session_ttl_secs,
            hash_rounds: DEFAULT_HASH_ROUNDS,
        })
    }

    /// PBKDF2 rounds used by [`Self::register`].
    #[must_use]
    pub fn with_hash_rounds(mut self, rounds: u32) -> Self {
        self.hash_rounds = rounds;
        self
    }

    // ── User Management ─────────────────────────────────────────────

    /// Register a new user. Returns the user ID.
    pub fn register(&self, username: &str, password: &str) -> anyhow::Result<String> {
        if username.is_empty() {
            bail!("Username cannot be empty");
        }
        if username.trim() != username {
            bail!("Username cannot start or end with whitespace");
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            bail!("Username too long (max {MAX_USERNAME_LEN} characters)");
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            bail!("Password must be at least {MIN_PASSWORD_LEN} characters");
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        let password_hash = password::hash_password(password, self.hash_rounds)?;
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, username, password_hash, now],
        );

        match result {
            Ok(_) => {
                tracing::info!(user_id = %user_id, username, "User registered");
                Ok(user_id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Username '{}' is already taken", username)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Count registered users.
    pub fn user_count(&self) -> anyhow::Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ── Session Management ──────────────────────────────────────────

    /// Count stored sessions, expired ones included.
    pub fn session_count(&self) -> anyhow::Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Revoke all sessions for a user.
    pub fn revoke_all_sessions(&self, user_id: &str) -> anyhow::Result<u64> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE user_id = ?1",
            rusqlite::params![user_id],
        )?;
        Ok(deleted as u64)
    }

    /// Clean up expired sessions.
    pub fn cleanup_expired_sessions(&self) -> anyhow::Result<u64> {
        let now = epoch_secs();
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            rusqlite::params![now],
        )?;
        if deleted > 0 {
            tracing::debug!(removed = deleted, "Swept expired sessions");
        }
        Ok(deleted as u64)
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| AuthError::internal(op, e))?
    }
}

// ── Consistent reads ────────────────────────────────────────────────

/// Look up one user inside a deferred transaction.
fn read_user(conn: &mut Connection, column: &'static str, value: &str) -> Result<IdentityRecord> {
    let op = "query user";
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Deferred)
        .map_err(|e| AuthError::internal(op, e))?;

    let sql = format!("SELECT id, username, password_hash FROM users WHERE {column} = ?1");
    let user = tx
        .query_row(&sql, rusqlite::params![value], |row| {
            Ok(IdentityRecord {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
            })
        })
        .optional()
        .map_err(|e| AuthError::internal(op, e))?;

    tx.commit().map_err(|e| AuthError::internal(op, e))?;
    user.ok_or_else(|| AuthError::not_found(op, "user"))
}

#[async_trait]
impl CredentialStore for SqliteAuthStore {
    async fn user_by_username(&self, username: &str) -> Result<IdentityRecord> {
        let username = username.to_string();
        self.blocking("user by username", move |conn| {
            read_user(conn, "username", &username)
        })
        .await
    }

    async fn user_by_id(&self, user_id: &str) -> Result<IdentityRecord> {
        let user_id = user_id.to_string();
        self.blocking("user by id", move |conn| read_user(conn, "id", &user_id))
            .await
    }
}

#[async_trait]
impl SessionStore for SqliteAuthStore {
    async fn put(&self, token: &SessionToken, user_id: &str) -> Result<()> {
        let token_hash = hash_token(token);
        let user_id = user_id.to_string();
        let now = epoch_secs();
        let expires_at = self.session_ttl_secs.map(|ttl| now.saturating_add(ttl as i64));

        self.blocking("insert session", move |conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![token_hash, user_id, now, expires_at],
            )
            .map_err(|e| AuthError::internal("insert session", e))?;
            Ok(())
        })
        .await
    }

    async fn get_and_delete(&self, token: &SessionToken) -> Result<String> {
        let token_hash = hash_token(token);
        let now = epoch_secs();

        self.blocking("delete session", move |conn| {
            let op = "delete session";
            // IMMEDIATE takes the write lock up front so select + delete is one step.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| AuthError::internal(op, e))?;

            let row: Option<(String, Option<i64>)> = tx
                .query_row(
                    "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
                    rusqlite::params![token_hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| AuthError::internal(op, e))?;

            let Some((user_id, expires_at)) = row else {
                return Err(AuthError::not_found(op, "session"));
            };

            tx.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                rusqlite::params![token_hash],
            )
            .map_err(|e| AuthError::internal(op, e))?;
            tx.commit().map_err(|e| AuthError::internal(op, e))?;

            match expires_at {
                Some(at) if at <= now => Err(AuthError::not_found(op, "session")),
                _ => Ok(user_id),
            }
        })
        .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
fn hash_token(token: &SessionToken) -> String {
    let mut h = Sha256::new();
    h.update(token.as_str().as_bytes());
    hex::encode(h.finalize())
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEST_ROUNDS: u32 = 1_000;

    fn test_store(ttl: Option<u64>) -> (TempDir, SqliteAuthStore) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("auth.db");
        let store = SqliteAuthStore::new(&db_path, ttl)
            .unwrap()
            .with_hash_rounds(TEST_ROUNDS);
        (tmp, store)
    }

    #[tokio::test]
    async fn register_and_lookup_by_username_and_id() {
        let (_tmp, store) = test_store(None);

        let user_id = store.register("test_user", "securepassword123").unwrap();
        assert!(!user_id.is_empty());

        let by_name = store.user_by_username("test_user").await.unwrap();
        assert_eq!(by_name.id, user_id);
        assert!(password::verify_password(&by_name.password_hash, "securepassword123").unwrap());

        let by_id = store.user_by_id(&user_id).await.unwrap();
        assert_eq!(by_id, by_name);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let (_tmp, store) = test_store(None);
        let err = store.user_by_username("ghost_user").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.context(), "query user");

        assert!(store.user_by_id("nonexistent_id").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let (_tmp, store) = test_store(None);
        store.register("TestUser", "password123!").unwrap();
        store.register("testuser", "password123!").unwrap();
        assert!(store.user_by_username("TESTUSER").await.unwrap_err().is_not_found());
        assert_eq!(store.user_count().unwrap(), 2);
    }

    #[test]
    fn register_duplicate_username_fails() {
        let (_tmp, store) = test_store(None);

        store.register("test_user", "password123!").unwrap();
        let result = store.register("test_user", "otherpassword1");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("already taken"));
    }

    #[test]
    fn register_validates_input() {
        let (_tmp, store) = test_store(None);

        let err = store.register("", "password123!").unwrap_err();
        assert!(err.to_string().contains("empty"));

        let err = store.register(" padded ", "password123!").unwrap_err();
        assert!(err.to_string().contains("whitespace"));

        let err = store.register(&"x".repeat(65), "password123!").unwrap_err();
        assert!(err.to_string().contains("too long"));

        let err = store.register("test_user", "short").unwrap_err();
        assert!(err.to_string().contains("8 characters"));

        assert_eq!(store.user_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn session_put_then_get_and_delete_once() {
        let (_tmp, store) = test_store(None);
        let user_id = store.register("test_user", "securepassword123").unwrap();
        let token = SessionToken::new("opaque-token-value");

        store.put(&token, &user_id).await.unwrap();
        assert_eq!(store.session_count().unwrap(), 1);

        assert_eq!(store.get_and_delete(&token).await.unwrap(), user_id);
        let err = store.get_and_delete(&token).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn session_tokens_stored_hashed() {
        let (_tmp, store) = test_store(None);
        let user_id = store.register("test_user", "securepassword123").unwrap();
        let token = SessionToken::new("opaque-token-value");
        store.put(&token, &user_id).await.unwrap();

        let conn = store.conn.lock();
        let stored: String = conn
            .query_row("SELECT token_hash FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_ne!(stored, token.as_str());
        assert_eq!(stored, hash_token(&token));
    }

    #[tokio::test]
    async fn session_for_unknown_user_rejected_by_foreign_key() {
        let (_tmp, store) = test_store(None);
        let err = store
            .put(&SessionToken::new("t"), "missing-user")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[tokio::test]
    async fn expired_session_is_not_found_and_removed() {
        let (_tmp, store) = test_store(Some(0));
        let user_id = store.register("test_user", "securepassword123").unwrap();
        let token = SessionToken::new("short-lived");
        store.put(&token, &user_id).await.unwrap();

        assert!(store.get_and_delete(&token).await.unwrap_err().is_not_found());
        assert_eq!(store.session_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired_sessions() {
        let (_tmp, expiring) = test_store(Some(0));
        let user_id = expiring.register("test_user", "securepassword123").unwrap();
        expiring.put(&SessionToken::new("a"), &user_id).await.unwrap();
        expiring.put(&SessionToken::new("b"), &user_id).await.unwrap();
        assert_eq!(expiring.cleanup_expired_sessions().unwrap(), 2);

        let (_tmp2, lasting) = test_store(None);
        let user_id = lasting.register("test_user", "securepassword123").unwrap();
        lasting.put(&SessionToken::new("a"), &user_id).await.unwrap();
        assert_eq!(lasting.cleanup_expired_sessions().unwrap(), 0);
        assert_eq!(lasting.session_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn session_revoke_all_for_user() {
        let (_tmp, store) = test_store(None);

        let user_id = store.register("test_user", "securepassword123").unwrap();
        let t1 = SessionToken::new("t1");
        let t2 = SessionToken::new("t2");
        store.put(&t1, &user_id).await.unwrap();
        store.put(&t2, &user_id).await.unwrap();

        assert_eq!(store.revoke_all_sessions(&user_id).unwrap(), 2);
        assert!(store.get_and_delete(&t1).await.unwrap_err().is_not_found());
        assert!(store.get_and_delete(&t2).await.unwrap_err().is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_get_and_delete_sees_entry_once() {
        let (_tmp, store) = test_store(None);
        let user_id = store.register("test_user", "securepassword123").unwrap();
        let token = SessionToken::new("contended");
        store.put(&token, &user_id).await.unwrap();

        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let token = token.clone();
            handles.push(tokio::spawn(async move { store.get_and_delete(&token).await }));
        }

        let mut hits = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                hits += 1;
            }
        }
        assert_eq!(hits, 1);
    }

    #[test]
    fn user_count_tracks_registrations() {
        let (_tmp, store) = test_store(None);

        assert_eq!(store.user_count().unwrap(), 0);
        store.register("user_a", "password123!").unwrap();
        assert_eq!(store.user_count().unwrap(), 1);
        store.register("user_b", "password456!").unwrap();
        assert_eq!(store.user_count().unwrap(), 2);
    }
}
