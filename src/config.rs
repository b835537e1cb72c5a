//! Configuration loaded from TOML with environment overrides.
//!
//! ```toml
//! [auth]
//! signing_secret = "..."        # or SESSIONGATE_SIGNING_SECRET
//! session_ttl_secs = 2592000    # omit for sessions that only end on logout
//! hash_rounds = 100000
//! operation_timeout_ms = 5000
//!
//! [storage]
//! database_path = "sessiongate.db"
//!
//! [logging]
//! level = "info"
//! ansi = true
//! ```

use crate::auth::password::DEFAULT_HASH_ROUNDS;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `auth.signing_secret`.
pub const SIGNING_SECRET_ENV: &str = "SESSIONGATE_SIGNING_SECRET";

/// Environment variable overriding `storage.database_path`.
pub const DATABASE_PATH_ENV: &str = "SESSIONGATE_DATABASE_PATH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// `[auth]` section.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HS512 signing secret. Changing it invalidates every
    /// outstanding session token.
    pub signing_secret: String,
    pub session_ttl_secs: Option<u64>,
    /// PBKDF2 rounds for newly registered passwords.
    pub hash_rounds: u32,
    /// Per-step deadline for store and notifier calls.
    pub operation_timeout_ms: Option<u64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_secret: String::new(),
            session_ttl_secs: None,
            hash_rounds: DEFAULT_HASH_ROUNDS,
            operation_timeout_ms: None,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.signing_secret.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("AuthConfig")
            .field("signing_secret", &secret)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("hash_rounds", &self.hash_rounds)
            .field("operation_timeout_ms", &self.operation_timeout_ms)
            .finish()
    }
}

impl AuthConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sessiongate.db"),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist, then apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            Self::from_toml_str(&raw)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(SIGNING_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.auth.signing_secret = secret;
        }
        if let Some(path) = lookup(DATABASE_PATH_ENV).filter(|v| !v.is_empty()) {
            self.storage.database_path = PathBuf::from(path);
        }
    }

    /// Check values every command depends on. The signing secret is checked
    /// separately by [`Self::signing_secret`], since only commands that issue
    /// or verify tokens need it.
    pub fn validate(&self) -> Result<()> {
        if self.auth.hash_rounds == 0 {
            bail!("auth.hash_rounds must be positive");
        }
        if self.auth.operation_timeout_ms == Some(0) {
            bail!("auth.operation_timeout_ms must be positive when set");
        }
        Ok(())
    }

    /// The configured signing secret, or an error when it is unset.
    pub fn signing_secret(&self) -> Result<&[u8]> {
        if self.auth.signing_secret.is_empty() {
            bail!("auth.signing_secret is not set (config file or {SIGNING_SECRET_ENV})");
        }
        Ok(self.auth.signing_secret.as_bytes())
    }
}
