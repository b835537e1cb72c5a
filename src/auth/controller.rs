//! Login and logout orchestration.
//!
//! Login: credential read → password check → token issue → session write → notify.
//! Logout: atomic session delete → credential read → notify.
//!
//! Steps run strictly in order and each one gates the next. Password checks
//! run on the blocking pool and count as a step for the timeout. The session
//! write is the point of no return: dropping a login future before it
//! completes leaves no session behind, dropping it afterwards does not undo
//! the write.

use super::password::{self, DEFAULT_HASH_ROUNDS};
use super::token::{SessionToken, TokenIssuer};
use super::traits::{AuthRequestMetadata, CredentialStore, EventNotifier, SessionStore};
use crate::error::{AuthError, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Result of a login attempt that did not hit an internal failure.
///
/// `Rejected` covers both an unknown username and a wrong password so
/// callers cannot tell the two apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(SessionToken),
    Rejected,
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            Self::Authenticated(token) => Some(token),
            Self::Rejected => None,
        }
    }

    pub fn into_token(self) -> Option<SessionToken> {
        match self {
            Self::Authenticated(token) => Some(token),
            Self::Rejected => None,
        }
    }
}

/// Stateless session controller, shareable across concurrent requests.
#[derive(Clone)]
pub struct SessionController {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    notifier: Arc<dyn EventNotifier>,
    issuer: TokenIssuer,
    step_timeout: Option<Duration>,
    decoy_rounds: u32,
}

impl SessionController {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        notifier: Arc<dyn EventNotifier>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            credentials,
            sessions,
            notifier,
            issuer,
            step_timeout: None,
            decoy_rounds: DEFAULT_HASH_ROUNDS,
        }
    }

    /// PBKDF2 rounds spent on an unknown username. Set this to the round
    /// count the credential store hashes with, or misses answer faster
    /// than wrong passwords.
    #[must_use]
    pub fn with_hash_rounds(mut self, rounds: u32) -> Self {
        self.decoy_rounds = rounds;
        self
    }

    /// Bound every collaborator call by `timeout`. An elapsed step is an
    /// internal error for that step.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Authenticate `username`/`password` and open a session.
    ///
    /// Returns `Ok(Rejected)` for bad credentials of any kind, and `Err`
    /// only when some step failed internally. After an `Err` from the
    /// notifier the session has been stored; a later logout still works.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        metadata: &AuthRequestMetadata,
    ) -> Result<LoginOutcome> {
        if username.is_empty() || password.is_empty() {
            tracing::debug!("Login rejected: empty username or password");
            return Ok(LoginOutcome::Rejected);
        }

        let user = match self
            .step(
                &format!("user by username [username={username}]"),
                self.credentials.user_by_username(username),
            )
            .await
        {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                self.decoy_check(password).await.map_err(|e| e.wrap("login"))?;
                tracing::debug!(username, reason = %e, "Login rejected: unknown username");
                return Ok(LoginOutcome::Rejected);
            }
            Err(e) => return Err(e.wrap("login")),
        };

        let stored_hash = user.password_hash.clone();
        let candidate = password.to_string();
        let verdict = self
            .step(
                &format!("verify password [user_id={}]", user.id),
                off_runtime("verify password", move || {
                    Ok(password::verify_password(&stored_hash, &candidate))
                }),
            )
            .await
            .map_err(|e| e.wrap("login"))?;

        match verdict {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
                return Ok(LoginOutcome::Rejected);
            }
            Err(e) => {
                tracing::warn!(user_id = %user.id, error = %e, "Login rejected: unusable stored password hash");
                return Ok(LoginOutcome::Rejected);
            }
        }

        let token = self
            .issuer
            .issue(&user.username)
            .map_err(|e| {
                e.wrap(&format!("generate session token [user_id={}]", user.id))
                    .wrap("login")
            })?;

        self.step(
            &format!(
                "store session token [user_id={} session={}]",
                user.id,
                token.fingerprint()
            ),
            self.sessions.put(&token, &user.id),
        )
        .await
        .map_err(|e| e.wrap("login"))?;

        let notify_op = format!(
            "notify user logged in [user_id={} username={}]",
            user.id, user.username
        );
        self.step(&notify_op, async {
            self.notifier
                .notify_user_logged_in(&user.id, &user.username, metadata)
                .await
                .map_err(|e| AuthError::internal("", e))
        })
        .await
        .map_err(|e| e.wrap("login"))?;

        tracing::debug!(user_id = %user.id, session = %token.fingerprint(), "Session opened");
        Ok(LoginOutcome::Authenticated(token))
    }

    /// Revoke the session for `token`.
    ///
    /// An unknown token is `NotFound` and triggers no further lookups. Once
    /// the session is deleted it stays deleted, even if the audit lookup or
    /// notification that follows fails.
    pub async fn logout(&self, token: &SessionToken, metadata: &AuthRequestMetadata) -> Result<()> {
        let user_id = self
            .step(
                &format!("get and delete session [session={}]", token.fingerprint()),
                self.sessions.get_and_delete(token),
            )
            .await
            .map_err(|e| e.wrap("logout"))?;

        let user = self
            .step(
                &format!("user by id [user_id={user_id}]"),
                self.credentials.user_by_id(&user_id),
            )
            .await
            .map_err(|e| e.wrap("logout"))?;

        let notify_op = format!(
            "notify user logged out [user_id={user_id} username={}]",
            user.username
        );
        self.step(&notify_op, async {
            self.notifier
                .notify_user_logged_out(&user_id, &user.username, metadata)
                .await
                .map_err(|e| AuthError::internal("", e))
        })
        .await
        .map_err(|e| e.wrap("logout"))?;

        tracing::debug!(user_id = %user_id, session = %token.fingerprint(), "Session closed");
        Ok(())
    }

    /// Spend the same PBKDF2 work a real check would, for a username that
    /// does not exist. Only a failed or timed-out step is an error.
    async fn decoy_check(&self, password: &str) -> Result<()> {
        let candidate = password.to_string();
        let rounds = self.decoy_rounds;
        self.step(
            "verify password [decoy]",
            off_runtime("verify password", move || {
                let _ = password::decoy_hash(&candidate, rounds);
                Ok(())
            }),
        )
        .await
    }

    /// Run one collaborator call, labelling its error with `op` and applying
    /// the step timeout if one is set.
    async fn step<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(AuthError::internal_msg(
                        op,
                        format!("timed out after {}ms", limit.as_millis()),
                    ))
                }
            },
            None => fut.await,
        };
        result.map_err(|e| e.wrap(op))
    }
}

/// Run CPU-bound work on the blocking pool.
async fn off_runtime<T, F>(op: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::internal(op, e))?
}
