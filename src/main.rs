//! `sessiongate` admin CLI.
//!
//! Drives the session controller against the configured SQLite database:
//! register users, open and close sessions, sweep expired sessions.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sessiongate::auth::{password, TracingNotifier};
use sessiongate::{
    logging, AuthRequestMetadata, Config, LoginOutcome, SessionController, SessionToken,
    SqliteAuthStore, TokenIssuer,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "sessiongate", version, about = "Session authentication admin tool")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, default_value = "sessiongate.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage registered users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Log in and print the session token
    Login {
        username: String,
        #[arg(long, env = "SESSIONGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke a session token
    Logout { token: String },
    /// Session maintenance
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Print a PBKDF2 hash for a password
    HashPassword {
        #[arg(long, env = "SESSIONGATE_PASSWORD", hide_env_values = true)]
        password: String,
        /// Override the configured round count
        #[arg(long)]
        rounds: Option<u32>,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a new user
    Add {
        username: String,
        #[arg(long, env = "SESSIONGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print the number of registered users
    Count,
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// Delete expired sessions
    Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    logging::init_tracing(&config.logging)?;

    tracing::debug!(config = ?config, "Loaded configuration");

    match cli.command {
        Command::HashPassword { password, rounds } => {
            let hash = password::hash_password(&password, rounds.unwrap_or(config.auth.hash_rounds))?;
            println!("{hash}");
        }
        Command::User { command } => {
            let store = open_store(&config)?;
            match command {
                UserCommand::Add { username, password } => {
                    let user_id = store.register(&username, &password)?;
                    println!("{user_id}");
                }
                UserCommand::Count => println!("{}", store.user_count()?),
            }
        }
        Command::Sessions {
            command: SessionsCommand::Sweep,
        } => {
            let store = open_store(&config)?;
            let removed = store.cleanup_expired_sessions()?;
            println!("removed {removed} expired session(s)");
        }
        Command::Login { username, password } => {
            let controller = build_controller(&config)?;
            match controller.login(&username, &password, &cli_metadata()).await? {
                LoginOutcome::Authenticated(token) => println!("{}", token.as_str()),
                LoginOutcome::Rejected => bail!("authentication failed"),
            }
        }
        Command::Logout { token } => {
            let controller = build_controller(&config)?;
            controller
                .logout(&SessionToken::new(token), &cli_metadata())
                .await
                .context("logout failed")?;
            println!("logged out");
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<SqliteAuthStore> {
    let store = SqliteAuthStore::new(&config.storage.database_path, config.auth.session_ttl_secs)
        .with_context(|| {
            format!(
                "Failed to open auth database {}",
                config.storage.database_path.display()
            )
        })?;
    Ok(store.with_hash_rounds(config.auth.hash_rounds))
}

fn build_controller(config: &Config) -> Result<SessionController> {
    let store = Arc::new(open_store(config)?);
    let controller = SessionController::new(
        store.clone(),
        store,
        Arc::new(TracingNotifier),
        TokenIssuer::new(config.signing_secret()?),
    )
    .with_hash_rounds(config.auth.hash_rounds);
    Ok(match config.auth.operation_timeout() {
        Some(timeout) => controller.with_timeout(timeout),
        None => controller,
    })
}

fn cli_metadata() -> AuthRequestMetadata {
    AuthRequestMetadata {
        host: "localhost".to_string(),
        user_agent: format!("sessiongate-cli/{}", env!("CARGO_PKG_VERSION")),
        remote_addr: "local".to_string(),
    }
}
