//! Application configuration management

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;

/// Log output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => anyhow::bail!("Unknown LOG_FORMAT '{}'", other),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address (defaults to 0.0.0.0)
    pub host: Option<String>,

    /// Server port
    pub port: u16,

    /// SQLite URL or path. Plain paths are turned into `sqlite://` URLs.
    pub database_url: String,

    /// Pool size for the SQLite connection pool
    pub database_max_connections: u32,

    /// JWT secret for signing and verifying session tokens
    pub jwt_secret: String,

    /// True when JWT_SECRET was unset and a random secret was generated
    pub jwt_secret_ephemeral: bool,

    /// Session token lifetime in seconds
    pub jwt_expiry_secs: i64,

    /// Bcrypt cost factor
    pub bcrypt_cost: u32,

    /// Microsoft Graph base URL (overridable for tests and sovereign clouds)
    pub graph_api_base: String,

    /// Graph requests per second shared by all running scans
    pub graph_requests_per_second: u32,

    /// Burst capacity above the steady Graph request rate
    pub graph_burst_size: u32,

    /// Per-request timeout for Graph calls
    pub graph_timeout: Duration,

    /// Retries for a transient page failure before the folder is abandoned (0 = none)
    pub scan_page_retries: u32,

    /// Provider name recorded when a scan request does not specify one
    pub default_provider: String,

    /// Tracing output format
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_PATH")
            .or_else(|_| env::var("DATABASE_URL"))
            .unwrap_or_else(|_| "./data/freakflix.db".to_string());

        let (jwt_secret, jwt_secret_ephemeral) = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => (secret.trim().to_string(), false),
            _ => (generate_dev_secret(), true),
        };

        Ok(Self {
            host: env::var("HOST").ok(),

            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("Invalid PORT")?,

            database_url: normalize_database_url(&database_url),

            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,

            jwt_secret,

            jwt_secret_ephemeral,

            jwt_expiry_secs: parse_or("JWT_EXPIRY_SECS", 7 * 24 * 60 * 60)?,

            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,

            graph_api_base: env::var("GRAPH_API_BASE")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".to_string())
                .trim_end_matches('/')
                .to_string(),

            graph_requests_per_second: parse_or("GRAPH_REQUESTS_PER_SECOND", 4)?,

            graph_burst_size: parse_or("GRAPH_BURST_SIZE", 10)?,

            graph_timeout: Duration::from_secs(parse_or("GRAPH_TIMEOUT_SECS", 30)?),

            scan_page_retries: parse_or("SCAN_PAGE_RETRIES", 0)?,

            default_provider: env::var("DEFAULT_PROVIDER").unwrap_or_else(|_| "onedrive".to_string()),

            log_format: env::var("LOG_FORMAT")
                .ok()
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(LogFormat::Json),
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is unset.
/// A value that is set but unparsable is an error.
fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Turn a bare filesystem path into a sqlx SQLite URL.
pub fn normalize_database_url(value: &str) -> String {
    if value.starts_with("sqlite:") {
        value.to_string()
    } else {
        format!("sqlite://{}", value)
    }
}

fn generate_dev_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_database_url() {
        assert_eq!(normalize_database_url("./data/app.db"), "sqlite://./data/app.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("sqlite:///abs/app.db"), "sqlite:///abs/app.db");
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_dev_secret_is_random() {
        assert_ne!(generate_dev_secret(), generate_dev_secret());
    }
}
