//! Server-side session authentication.
//!
//! Verifies credentials, issues signed bearer session tokens, keeps a
//! revocable token → user mapping, and reports login/logout events.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;

pub use auth::{
    AuthRequestMetadata, LoginOutcome, SessionController, SessionToken, SqliteAuthStore,
    TokenIssuer,
};
pub use config::Config;
pub use error::{AuthError, ErrorKind};
