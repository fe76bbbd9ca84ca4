use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub admin_email: Option<String>,
    pub token_ttl_hours: i64,
    pub vote_attempts: usize,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source; unset keys fall back to
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = lookup("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = lookup("AGORA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("AGORA_PORT")
            .unwrap_or_else(|| "5000".into())
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let token_ttl_hours: i64 = match lookup("AGORA_TOKEN_TTL_HOURS") {
            Some(v) => v.parse().context("AGORA_TOKEN_TTL_HOURS must be a number")?,
            None => 1,
        };
        if token_ttl_hours <= 0 {
            bail!("AGORA_TOKEN_TTL_HOURS must be positive");
        }

        let vote_attempts: usize = match lookup("AGORA_VOTE_ATTEMPTS") {
            Some(v) => v.parse().context("AGORA_VOTE_ATTEMPTS must be a number")?,
            None => 3,
        };
        if vote_attempts == 0 {
            bail!("AGORA_VOTE_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            jwt_secret,
            db_path: lookup("AGORA_DB_PATH")
                .unwrap_or_else(|| "agora.db".into())
                .into(),
            addr,
            upload_dir: lookup("AGORA_UPLOAD_DIR")
                .unwrap_or_else(|| "./uploads".into())
                .into(),
            admin_email: lookup("AGORA_ADMIN_EMAIL").filter(|e| !e.trim().is_empty()),
            token_ttl_hours,
            vote_attempts,
        })
    }
}
