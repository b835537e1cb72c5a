//! Event notifier implementations.
//!
//! - [`TracingNotifier`] writes audit lines to the `sessiongate::audit` target.
//! - [`ChannelNotifier`] hands [`AuthEvent`]s to an async consumer over a
//!   bounded channel (e.g. a task publishing to a message bus).

use super::traits::{AuthRequestMetadata, EventNotifier};
use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default capacity for [`ChannelNotifier::channel`].
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Which transition an [`AuthEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    LoggedIn,
    LoggedOut,
}

impl AuthEventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::LoggedIn => "user-logged-in",
            Self::LoggedOut => "user-logged-out",
        }
    }
}

/// A login or logout event with its request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub user_id: String,
    pub username: String,
    pub metadata: AuthRequestMetadata,
}

// ── Tracing notifier ─────────────────────────────────────────────

/// Audit notifier backed by `tracing`. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl EventNotifier for TracingNotifier {
    async fn notify_user_logged_in(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()> {
        tracing::info!(
            target: "sessiongate::audit",
            event = AuthEventKind::LoggedIn.label(),
            user_id,
            username,
            host = %metadata.host,
            user_agent = %metadata.user_agent,
            remote_addr = %metadata.remote_addr,
            "User logged in"
        );
        Ok(())
    }

    async fn notify_user_logged_out(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()> {
        tracing::info!(
            target: "sessiongate::audit",
            event = AuthEventKind::LoggedOut.label(),
            user_id,
            username,
            host = %metadata.host,
            user_agent = %metadata.user_agent,
            remote_addr = %metadata.remote_addr,
            "User logged out"
        );
        Ok(())
    }
}

// ── Channel notifier ─────────────────────────────────────────────

/// Forwards events into a bounded mpsc channel without waiting for capacity.
///
/// A full buffer or a dropped receiver is reported as an error so the
/// calling operation fails instead of silently losing the audit event.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<AuthEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<AuthEvent>) -> Self {
        Self { tx }
    }

    /// Create a notifier and the receiving end for its consumer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuthEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    fn send(&self, event: AuthEvent) -> anyhow::Result<()> {
        let kind = event.kind;
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                bail!("event buffer full, dropping {} event", kind.label())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                bail!("event consumer gone, dropping {} event", kind.label())
            }
        }
    }
}

#[async_trait]
impl EventNotifier for ChannelNotifier {
    async fn notify_user_logged_in(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()> {
        self.send(AuthEvent {
            kind: AuthEventKind::LoggedIn,
            user_id: user_id.to_string(),
            username: username.to_string(),
            metadata: metadata.clone(),
        })
    }

    async fn notify_user_logged_out(
        &self,
        user_id: &str,
        username: &str,
        metadata: &AuthRequestMetadata,
    ) -> anyhow::Result<()> {
        self.send(AuthEvent {
            kind: AuthEventKind::LoggedOut,
            user_id: user_id.to_string(),
            username: username.to_string(),
            metadata: metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> AuthRequestMetadata {
        AuthRequestMetadata {
            host: "auth.example.org".into(),
            user_agent: "curl/8.5".into(),
            remote_addr: "10.0.0.7:51234".into(),
        }
    }

    #[tokio::test]
    async fn tracing_notifier_never_fails() {
        let notifier = TracingNotifier;
        notifier.notify_user_logged_in("u1", "alice", &meta()).await.unwrap();
        notifier.notify_user_logged_out("u1", "alice", &meta()).await.unwrap();
    }

    #[tokio::test]
    async fn channel_notifier_delivers_events_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        notifier.notify_user_logged_in("u1", "alice", &meta()).await.unwrap();
        notifier.notify_user_logged_out("u1", "alice", &meta()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, AuthEventKind::LoggedIn);
        assert_eq!(first.user_id, "u1");
        assert_eq!(first.metadata, meta());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, AuthEventKind::LoggedOut);
    }

    #[tokio::test]
    async fn channel_notifier_errors_when_consumer_dropped() {
        let (notifier, rx) = ChannelNotifier::channel(4);
        drop(rx);
        let err = notifier
            .notify_user_logged_in("u1", "alice", &meta())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("consumer gone"));
    }

    #[tokio::test]
    async fn channel_notifier_errors_when_full() {
        let (notifier, _rx) = ChannelNotifier::channel(1);
        notifier.notify_user_logged_in("u1", "alice", &meta()).await.unwrap();
        let err = notifier
            .notify_user_logged_out("u1", "alice", &meta())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("buffer full"));
    }

    #[test]
    fn event_serializes_with_snake_case_kind() {
        let event = AuthEvent {
            kind: AuthEventKind::LoggedOut,
            user_id: "u1".into(),
            username: "alice".into(),
            metadata: meta(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "logged_out");
        assert_eq!(json["metadata"]["remote_addr"], "10.0.0.7:51234");
    }
}
