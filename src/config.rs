//! Configuration loader for the `levelwatch` backend service.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). Everything the ingestion coordinator
//! needs — the shared ingestion secret, the default notification target —
//! is a field here and is injected at construction, so the core never reads
//! the process environment ad hoc and stays testable.

use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional port-sized integer environment variable with a
/// default value. Values outside `u16` are rejected, not truncated.
macro_rules! parse_env_u16 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Read an optional string environment variable, treating empty as unset.
macro_rules! optional_env {
    ($var_name:expr) => {
        env::var($var_name).ok().filter(|v| !v.is_empty())
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// HTTP listen port.
    pub port: u16,

    /// Shared ingestion secret. When set, every telemetry payload must
    /// carry a matching `secret_key`.
    pub secret_key: Option<String>,

    /// Fallback Telegram chat id for devices without a configured target.
    pub default_chat_id: Option<String>,

    /// Telegram Bot API credential. Its absence is only an error at the
    /// first dispatch attempt, never at startup.
    pub telegram_bot_token: Option<String>,

    /// Telegram Bot API base URL, overridable for testing.
    pub telegram_api_url: String,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `PORT` – HTTP listen port (default: 8080)
/// - `GLOBAL_SECRET_KEY` – shared ingestion secret
/// - `TELEGRAM_BOT_TOKEN` – Bot API credential
/// - `TELEGRAM_DEFAULT_CHAT_ID` – fallback notification target
/// - `TELEGRAM_API_URL` – Bot API base (default: `https://api.telegram.org`)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let port = parse_env_u16!("PORT", 8080);

    Ok(Config {
        db_url,
        db_pool_max,
        port,
        secret_key: optional_env!("GLOBAL_SECRET_KEY"),
        default_chat_id: optional_env!("TELEGRAM_DEFAULT_CHAT_ID"),
        telegram_bot_token: optional_env!("TELEGRAM_BOT_TOKEN"),
        telegram_api_url: optional_env!("TELEGRAM_API_URL")
            .unwrap_or_else(|| "https://api.telegram.org".to_string()),
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords and the bot
    /// token while showing all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        // Mask the password in the database URL for security
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        let set_or_unset = |v: &Option<String>| if v.is_some() { "set" } else { "unset" };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL              : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX               : {}", self.db_pool_max);
        tracing::info!("  PORT                      : {}", self.port);
        tracing::info!("  GLOBAL_SECRET_KEY         : {}", set_or_unset(&self.secret_key));
        tracing::info!("  TELEGRAM_BOT_TOKEN        : {}", set_or_unset(&self.telegram_bot_token));
        tracing::info!(
            "  TELEGRAM_DEFAULT_CHAT_ID  : {}",
            self.default_chat_id.as_deref().unwrap_or("unset")
        );
        tracing::info!("  TELEGRAM_API_URL          : {}", self.telegram_api_url);
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    // One test owns the env mutations so parallel test threads never race
    // on the same variables.
    #[test]
    fn port_is_validated_not_truncated() {
        // ---
        env::set_var("DATABASE_URL", "postgres://localhost/levelwatch_test");

        env::set_var("PORT", "70000");
        let err = load_from_env().unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"), "got: {err}");

        env::set_var("PORT", "8081");
        let cfg = load_from_env().unwrap();
        assert_eq!(cfg.port, 8081);

        env::remove_var("PORT");
        assert_eq!(load_from_env().unwrap().port, 8080);
    }
}
