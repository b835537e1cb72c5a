//! Error taxonomy for the session controller and its collaborators.
//!
//! Three kinds matter to callers:
//! - [`ErrorKind::NotFound`] — an identity or session does not exist
//! - [`ErrorKind::BadInput`] — a token failed structural or signature checks
//! - [`ErrorKind::Internal`] — randomness, signing, storage, or notification failed
//!
//! A wrong password is *not* an error; see [`crate::auth::LoginOutcome`].

use std::fmt;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    BadInput,
    Internal,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::BadInput => "bad_input",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors surfaced by the session controller.
///
/// `context` is a `: `-joined chain of operation names, outermost first,
/// built up with [`AuthError::wrap`] as the error travels to the caller.
/// It never contains secrets, passwords, or full session tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{context}: {what} not found")]
    NotFound { context: String, what: &'static str },

    #[error("{context}: invalid token: {reason}")]
    InvalidToken { context: String, reason: String },

    #[error("{context}: {source:#}")]
    Internal {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

impl AuthError {
    pub fn not_found(context: impl Into<String>, what: &'static str) -> Self {
        Self::NotFound {
            context: context.into(),
            what,
        }
    }

    pub fn invalid_token(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(context: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Internal {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Internal error from a plain message, for failures with no underlying source.
    pub fn internal_msg(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::internal(context, anyhow::anyhow!("{message}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidToken { .. } => ErrorKind::BadInput,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn context(&self) -> &str {
        match self {
            Self::NotFound { context, .. }
            | Self::InvalidToken { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }

    /// Prefix the context chain with an outer operation name, keeping the kind.
    #[must_use]
    pub fn wrap(mut self, op: &str) -> Self {
        let context = match &mut self {
            Self::NotFound { context, .. }
            | Self::InvalidToken { context, .. }
            | Self::Internal { context, .. } => context,
        };
        *context = if context.is_empty() {
            op.to_string()
        } else {
            format!("{op}: {context}")
        };
        self
    }
}
