//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Base URL embedded in shareable affiliate links.
    pub public_base_url: String,
    pub payment_api_url: String,
    pub payment_api_token: String,
    /// Interval between deposit status polls.
    pub payment_poll_interval: Duration,
    /// ISO country code sent with deposit initiations.
    pub payment_country: String,
    /// Percentage of a sale retained by the platform before affiliate
    /// earnings are credited.
    pub platform_fee_percent: u8,
    /// Internal endpoint receiving purchase receipts. Optional; receipts
    /// are skipped when unset.
    pub notification_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Load Payment Gateway Settings ---
        let payment_api_url = std::env::var("PAYMENT_API_URL")
            .map_err(|_| ConfigError::MissingVar("PAYMENT_API_URL".to_string()))?;
        let payment_api_token = std::env::var("PAYMENT_API_TOKEN")
            .map_err(|_| ConfigError::MissingVar("PAYMENT_API_TOKEN".to_string()))?;

        let poll_interval_str =
            std::env::var("PAYMENT_POLL_INTERVAL_MS").unwrap_or_else(|_| "1500".to_string());
        let poll_interval_ms = poll_interval_str.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(
                "PAYMENT_POLL_INTERVAL_MS".to_string(),
                format!("'{}' is not a valid duration in milliseconds", poll_interval_str),
            )
        })?;
        let payment_poll_interval = Duration::from_millis(poll_interval_ms);

        let payment_country =
            std::env::var("PAYMENT_COUNTRY").unwrap_or_else(|_| "ZMB".to_string());

        let fee_str = std::env::var("PLATFORM_FEE_PERCENT").unwrap_or_else(|_| "30".to_string());
        let platform_fee_percent = fee_str
            .parse::<u8>()
            .ok()
            .filter(|fee| *fee <= 100)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "PLATFORM_FEE_PERCENT".to_string(),
                    format!("'{}' is not a percentage between 0 and 100", fee_str),
                )
            })?;

        let notification_url = std::env::var("NOTIFICATION_URL").ok();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            public_base_url,
            payment_api_url,
            payment_api_token,
            payment_poll_interval,
            payment_country,
            platform_fee_percent,
            notification_url,
        })
    }
}
