//! Session authentication.
//!
//! Provides:
//! - Login: credential check, signed session token, server-side session entry
//! - Logout: atomic session revocation with audit notification
//! - PBKDF2 password hashing with constant-time verification
//! - SQLite and in-memory stores, tracing and channel notifiers
//!
//! ## Design Decisions
//! - Tokens are HS512-signed compact tokens carrying the username and 512
//!   bytes of OS randomness, so they self-verify, and are *also* stored
//!   server-side (as a SHA-256 digest) so logout can revoke them.
//! - A wrong password or unknown username is [`LoginOutcome::Rejected`],
//!   not an error. Errors mean something internal broke.
//! - The controller holds no mutable state; collaborators sit behind
//!   async traits and own their concurrency control.

pub mod controller;
pub mod memory;
pub mod notifier;
pub mod password;
pub mod store;
pub mod token;
pub mod traits;

pub use controller::{LoginOutcome, SessionController};
pub use memory::MemorySessionStore;
pub use notifier::{AuthEvent, AuthEventKind, ChannelNotifier, TracingNotifier};
pub use store::SqliteAuthStore;
pub use token::{SessionToken, TokenClaims, TokenIssuer};
pub use traits::{AuthRequestMetadata, CredentialStore, EventNotifier, IdentityRecord, SessionStore};
