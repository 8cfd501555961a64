//! # Configuration Management
//!
//! Configuration comes from the environment (12-factor style), with a `.env`
//! file loaded first when present.
//!
//! ## Environment Variables
//! - `HOST`: Server bind address (default: 127.0.0.1)
//! - `PORT`: Server port (default: 4000)
//! - `DATABASE_URL`: SQLite connection string, or `memory` for the in-memory stores
//! - `RP_ID`: Fixed relying-party id; derived from the request host when unset
//! - `EXPECTED_ORIGIN`: Fixed expected origin; derived from the request when unset
//! - `RP_NAME`: Human-readable relying-party name
//! - `CHALLENGE_TTL_SECS`: How long an issued challenge stays usable (default: 300)
//! - `CHALLENGE_SWEEP_SECS`: Interval of the stale-challenge sweep (default: 600)

use anyhow::{Context, Result};
use std::env;

/// Value of `DATABASE_URL` that selects the in-memory stores.
pub const MEMORY_DATABASE: &str = "memory";

#[derive(Debug, Clone)]
pub struct Config {
    /// Server host/IP address to bind to
    pub host: String,

    /// Server port number
    pub port: u16,

    /// SQLite database URL, e.g. "sqlite:passkeys.db?mode=rwc" (read, write, create)
    pub database_url: String,

    /// Relying-party id override, a bare domain such as "example.org".
    /// `None` means: use the request's host.
    pub rp_id: Option<String>,

    /// Expected-origin override, a full origin such as "https://example.org".
    /// `None` means: build it from the request's protocol and host.
    pub expected_origin: Option<String>,

    /// Name shown to users while creating a passkey
    pub rp_name: String,

    /// Staleness window for challenges, in seconds
    pub challenge_ttl_secs: i64,

    /// How often stale challenges are swept from storage, in seconds
    pub challenge_sweep_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            database_url: "sqlite:passkeys.db?mode=rwc".to_string(),
            rp_id: None,
            expected_origin: None,
            rp_name: "Electronic Nation".to_string(),
            challenge_ttl_secs: crate::webauthn::DEFAULT_CHALLENGE_TTL_SECS,
            challenge_sweep_secs: 600,
        }
    }
}

/// Reads `name`, treating unset and blank the same.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Fails only when a numeric variable does not parse.
    pub fn from_env() -> Result<Self> {
        // dotenvy doesn't error if the file is missing
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            host: optional("HOST").unwrap_or(defaults.host),
            port: match optional("PORT") {
                Some(port) => port.parse().context("PORT must be a port number")?,
                None => defaults.port,
            },
            database_url: optional("DATABASE_URL").unwrap_or(defaults.database_url),
            rp_id: optional("RP_ID"),
            expected_origin: optional("EXPECTED_ORIGIN"),
            rp_name: optional("RP_NAME").unwrap_or(defaults.rp_name),
            challenge_ttl_secs: match optional("CHALLENGE_TTL_SECS") {
                Some(secs) => secs
                    .parse()
                    .context("CHALLENGE_TTL_SECS must be a number of seconds")?,
                None => defaults.challenge_ttl_secs,
            },
            challenge_sweep_secs: match optional("CHALLENGE_SWEEP_SECS") {
                Some(secs) => secs
                    .parse()
                    .context("CHALLENGE_SWEEP_SECS must be a number of seconds")?,
                None => defaults.challenge_sweep_secs,
            },
        })
    }

    /// "host:port" for `tokio::net::TcpListener::bind()`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the in-memory stores were requested instead of SQLite.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }

    pub fn challenge_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.challenge_ttl_secs)
    }
}
