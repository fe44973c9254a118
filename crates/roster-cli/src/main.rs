//! Roster CLI - token and ledger maintenance
//!
//! Usage:
//!   roster hash-password <password>
//!   roster issue-token <subject> [--kind access|refresh]
//!   roster decode-token <token>
//!   roster prune-revoked
//!   roster check-config

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use roster_api::auth::jwt::now_unix;
use roster_api::auth::password::validate_password_rules;
use roster_api::auth::{
    AuthService, CredentialHasher, PasswordConfig, PgRevocationLedger, TokenCodec, TokenIssuer,
    TokenType,
};
use roster_api::state::AppState;
use roster_core::{AppConfig, PgProjectStore, PgUserStore};
use serde_json::json;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "roster")]
#[command(about = "Roster token and revocation ledger maintenance")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a password with the server's Argon2 parameters
    HashPassword {
        #[arg(env = "ROSTER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Issue tokens for a subject using the configured secret
    IssueToken {
        /// User id to place in the `sub` claim
        subject: String,
        /// Issue a single token instead of a pair
        #[arg(long, value_enum)]
        kind: Option<Kind>,
    },
    /// Decode and verify a token, printing its claims
    DecodeToken { token: String },
    /// Remove ledger records older than the refresh token lifetime
    PruneRevoked,
    /// Load and validate configuration
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Access,
    Refresh,
}

impl From<Kind> for TokenType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Access => TokenType::Access,
            Kind::Refresh => TokenType::Refresh,
        }
    }
}

fn hash_password(password: &str) -> anyhow::Result<()> {
    if let Err(rule) = validate_password_rules(password) {
        bail!("password rejected: {rule}");
    }
    let hasher = CredentialHasher::new(PasswordConfig::default())?;
    println!("{}", hasher.hash(password)?);
    Ok(())
}

fn issue_token(config: &AppConfig, subject: &str, kind: Option<Kind>) -> anyhow::Result<()> {
    let codec = Arc::new(TokenCodec::new(&config.auth)?);
    let issuer = TokenIssuer::new(codec.clone(), &config.auth);

    let Some(kind) = kind else {
        let pair = issuer.issue(subject)?;
        println!("{}", serde_json::to_string_pretty(&pair)?);
        return Ok(());
    };

    let token_type = TokenType::from(kind);
    let ttl = match token_type {
        TokenType::Access => config.auth.access_ttl_secs(),
        TokenType::Refresh => config.auth.refresh_ttl_secs(),
    };
    let now = now_unix();
    println!("{}", codec.encode(subject, token_type, now, now.saturating_add(ttl))?);
    Ok(())
}

fn decode_token(config: &AppConfig, token: &str) -> anyhow::Result<()> {
    let codec = TokenCodec::new(&config.auth)?;
    let payload = codec.decode(token)?;
    let claims = json!({
        "sub": payload.subject(),
        "type": payload.token_type(),
        "jti": payload.token_id(),
        "iat": payload.issued_at(),
        "exp": payload.expires_at(),
        "scope": payload.scope(),
    });
    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}

async fn prune_revoked(config: &AppConfig) -> anyhow::Result<()> {
    let url = config
        .database
        .postgres_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .context("DATABASE_URL must be set to prune the revocation ledger")?;

    let pool = roster_core::connect_pool(&config.database, url).await?;
    let ledger = PgRevocationLedger::from_pool(pool.clone());
    ledger.ensure_schema().await?;

    let state = AppState::new(
        config.clone(),
        Arc::new(PgUserStore::from_pool(pool.clone())),
        Arc::new(PgProjectStore::from_pool(pool)),
        Arc::new(ledger),
        PasswordConfig::default(),
    )?;
    println!("{}", prune_ledger(&state.auth).await?);
    Ok(())
}

async fn prune_ledger(auth: &AuthService) -> anyhow::Result<u64> {
    let removed = auth.prune_revoked().await?;
    tracing::info!(removed, "Pruned revocation ledger");
    Ok(removed)
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    TokenCodec::new(&config.auth)?;
    println!("server:   {}:{}", config.server.host, config.server.port);
    println!(
        "storage:  {}",
        if config.database.postgres_url.as_deref().is_some_and(|u| !u.is_empty()) {
            "postgres"
        } else {
            "memory"
        }
    );
    println!("auth:     {:?}", config.auth);
    println!("logging:  {} (json: {})", config.logging.level, config.logging.json_format);
    Ok(())
}

fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("invalid configuration")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::HashPassword { password } => hash_password(&password)?,
        Commands::IssueToken { subject, kind } => issue_token(&load_config()?, &subject, kind)?,
        Commands::DecodeToken { token } => decode_token(&load_config()?, &token)?,
        Commands::PruneRevoked => prune_revoked(&load_config()?).await?,
        Commands::CheckConfig => check_config(&load_config()?)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use roster_api::auth::{MemoryRevocationLedger, RevocationLedger};
    use roster_core::{MemoryProjectStore, MemoryUserStore};

    #[tokio::test]
    async fn test_prune_ledger_drops_records_past_refresh_lifetime() {
        let ledger = Arc::new(MemoryRevocationLedger::new());
        let now = Utc::now();
        ledger.record("stale", now - Duration::days(8)).await.unwrap();
        ledger.record("recent", now - Duration::days(1)).await.unwrap();

        let state = AppState::new(
            AppConfig::default(),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryProjectStore::new()),
            ledger.clone(),
            PasswordConfig::light(),
        )
        .unwrap();

        assert_eq!(prune_ledger(&state.auth).await.unwrap(), 1);
        assert!(ledger.is_revoked("recent").await.unwrap());
        assert!(!ledger.is_revoked("stale").await.unwrap());
    }
}
