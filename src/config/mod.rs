//! Configuration module for Campus Pulse.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Default quiet period before a search query fires.
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Buffered change events per realtime subscriber before it lags
    pub realtime_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("PULSE_API_PSK").ok();

        let db_path = env::var("PULSE_DB_PATH")
            .unwrap_or_else(|_| "./data/pulse.sqlite".to_string())
            .into();

        let bind_addr = env::var("PULSE_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid PULSE_BIND_ADDR format: {}", e)))?;

        let log_level = env::var("PULSE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let realtime_capacity = match env::var("PULSE_REALTIME_CAPACITY") {
            Ok(raw) => raw.parse().map_err(|e| {
                AppError::Internal(format!("Invalid PULSE_REALTIME_CAPACITY: {}", e))
            })?,
            Err(_) => 256,
        };

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            realtime_capacity,
        })
    }
}

/// Client-side configuration for the feed library.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the feed service, without the `/api` suffix
    pub base_url: String,
    /// Pre-shared key sent as `x-api-key`
    pub api_key: Option<String>,
    /// Where client-only key/value state (attendance counters) lives
    pub local_store_path: PathBuf,
    /// Quiet period before a search query fires
    pub search_debounce: Duration,
}

impl ClientConfig {
    /// Load client configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let base_url = env::var("PULSE_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let api_key = env::var("PULSE_API_KEY").ok();

        let local_store_path = env::var("PULSE_LOCAL_STORE_PATH")
            .unwrap_or_else(|_| "./data/local.json".to_string())
            .into();

        Self {
            base_url,
            api_key,
            local_store_path,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("PULSE_API_PSK");
        env::remove_var("PULSE_DB_PATH");
        env::remove_var("PULSE_BIND_ADDR");
        env::remove_var("PULSE_LOG_LEVEL");
        env::remove_var("PULSE_REALTIME_CAPACITY");
        env::remove_var("PULSE_BASE_URL");
        env::remove_var("PULSE_API_KEY");
        env::remove_var("PULSE_LOCAL_STORE_PATH");

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/pulse.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.realtime_capacity, 256);

        let client = ClientConfig::from_env();
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
        assert!(client.api_key.is_none());
        assert_eq!(client.search_debounce, Duration::from_millis(500));
    }
}
