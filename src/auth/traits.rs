//! Collaborator seams for the session controller.
//!
//! The controller owns no mutable state. Identities come from a
//! [`CredentialStore`], session mappings live in a [`SessionStore`], and
//! login/logout events go to an [`EventNotifier`]. Each collaborator is
//! responsible for its own concurrency control.

use super::token::SessionToken;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Identity record ──────────────────────────────────────────────

/// A registered account as stored by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    /// Opaque, stable identifier.
    pub id: String,
    /// Unique, case-sensitive username.
    pub username: String,
    /// PHC-encoded password hash.
    pub password_hash: String,
}

impl fmt::Debug for IdentityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

// ── Request metadata ─────────────────────────────────────────────

/// Per-request context forwarded to the notifier for auditing. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestMetadata {
    pub host: String,
    pub user_agent: String,
    pub remote_addr: String,
}

// ── Credential store ─────────────────────────────────────────────

/// Read-only identity lookups.
///
/// Both lookups must reflect committed state: implementations wrap them in
/// a consistent read (a transaction, even for a single statement) unless the
/// backend already guarantees it. An unknown identity is
/// [`crate::AuthError::NotFound`].
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn user_by_username(&self, username: &str) -> Result<IdentityRecord>;

    async fn user_by_id(&self, user_id: &str) -> Result<IdentityRecord>;
}

// ── Session store ────────────────────────────────────────────────

/// Token → user id mapping.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Once this returns `Ok` the session exists.
    async fn put(&self, token: &SessionToken, user_id: &str) -> Result<()>;

    /// Remove the session and return its user id in one indivisible step.
    ///
    /// At most one caller ever observes a given entry; every later call for
    /// the same token gets [`crate::AuthError::NotFound`].
    async fn get_and_delete(&self, token: &SessionToken) -> Result<String>;
}

// ── Event notifier ───────────────────────────────────────────────

/// Receives login/logout events. A failed notification fails the operation.
#[async_trait]
pub trait EventNotifier: Send + Sync {
    async fn notify_user_logged_in(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()>;

    async fn notify_user_logged_out(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()>;
}
