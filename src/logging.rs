//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job and happens once at startup.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Build the env filter: `RUST_LOG` if set, otherwise the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level '{}'", config.level)),
    }
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(true)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_levels_and_directives() {
        for level in ["info", "debug", "sessiongate=trace,warn"] {
            let config = LoggingConfig {
                level: level.to_string(),
                ansi: false,
            };
            assert!(EnvFilter::try_new(&config.level).is_ok(), "level {level}");
        }
    }

    #[test]
    fn rejects_garbage_level() {
        assert!(EnvFilter::try_new("sessiongate=loud").is_err());
    }
}
