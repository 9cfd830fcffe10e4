use std::env;
use std::path::PathBuf;
use anyhow::{Context, Result};
use deadpool_postgres::SslMode;
use zeroize::Zeroizing;

/// The cookie-signing secret used when `SESSION_SECRET` is not set.
pub const FALLBACK_SESSION_SECRET: &str = "secret";

/// Connection parameters for the PostgreSQL database.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub ssl_mode: SslMode,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The PostgreSQL connection parameters.
    pub database: DatabaseConfig,
    /// The address the HTTP server binds to.
    pub bind_addr: String,
    /// The port the HTTP server listens on.
    pub port: u16,
    /// The secret the session cookies are signed with.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// The lifetime of a session cookie in days.
    pub session_duration_days: i64,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
    /// Whether the hardened credential policy is enabled.
    pub hardening: bool,
    /// Directory holding `styles/` and `script.js`.
    pub static_dir: PathBuf,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let database = DatabaseConfig {
            user: env::var("DB_USER").context("DB_USER must be set")?,
            password: env::var("DB_PASSWORD").unwrap_or_default(),
            host: env::var("DB_HOST").context("DB_HOST must be set")?,
            port: env::var("DB_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()
                .context("Invalid DB_PORT")?,
            name: env::var("DB_NAME").context("DB_NAME must be set")?,
            ssl_mode: parse_ssl_mode(
                &env::var("DB_SSLMODE").unwrap_or_else(|_| "disable".to_string()),
            )?,
            pool_size: env::var("DB_POOL_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .context("Invalid DB_POOL_SIZE")?,
        };

        let session_secret = match env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => Zeroizing::new(secret.into_bytes()),
            _ => {
                tracing::warn!(
                    "⚠️ SESSION_SECRET is not set, signing session cookies with the built-in secret"
                );
                Zeroizing::new(FALLBACK_SESSION_SECRET.as_bytes().to_vec())
            }
        };

        Ok(Self {
            database,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid PORT")?,
            session_secret,
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
            secure_cookies: env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string())
                == "production",
            hardening: parse_flag(&env::var("AUTH_HARDENING").unwrap_or_default()),
            static_dir: PathBuf::from(env::var("STATIC_DIR").unwrap_or_else(|_| ".".to_string())),
        })
    }
}

#[cfg(test)]
impl Config {
    /// A configuration that never touches the environment.
    pub fn for_tests() -> Self {
        Self {
            database: DatabaseConfig {
                user: "postgres".to_string(),
                password: String::new(),
                host: "localhost".to_string(),
                port: 5432,
                name: "auth".to_string(),
                ssl_mode: SslMode::Disable,
                pool_size: 1,
            },
            bind_addr: "127.0.0.1".to_string(),
            port: 8000,
            session_secret: Zeroizing::new(b"test-secret".to_vec()),
            session_duration_days: 30,
            secure_cookies: false,
            hardening: false,
            static_dir: PathBuf::from("."),
        }
    }
}

/// Maps a libpq-style `sslmode` value onto the pool's SSL setting.
fn parse_ssl_mode(value: &str) -> Result<SslMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "disable" => Ok(SslMode::Disable),
        "prefer" => Ok(SslMode::Prefer),
        "require" => Ok(SslMode::Require),
        other => anyhow::bail!("Unsupported DB_SSLMODE: {}", other),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
