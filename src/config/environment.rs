// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses and validates engine knobs from environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! Environment-based configuration management for production deployment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{defaults, env_config};

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to `tracing::Level`
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Type-safe database location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    ///
    /// # Errors
    ///
    /// Returns an error for URL schemes other than `sqlite:`.
    pub fn parse_url(s: &str) -> Result<Self> {
        if let Some(path_str) = s.strip_prefix("sqlite:") {
            if path_str == ":memory:" {
                Ok(Self::Memory)
            } else {
                Ok(Self::SQLite {
                    path: PathBuf::from(path_str),
                })
            }
        } else if s.contains("://") {
            Err(anyhow::anyhow!("Unsupported database URL scheme: {s}"))
        } else {
            // Bare path, treat as SQLite file
            Ok(Self::SQLite {
                path: PathBuf::from(s),
            })
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_string(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/marcel.db"),
        }
    }
}

impl std::fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_connection_string())
    }
}

/// Engine configuration loaded from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Database location
    pub database_url: DatabaseUrl,
    /// Log level
    pub log_level: LogLevel,
    /// Paid fraction (percent of total price) at which a booking confirms
    pub partial_payment_percent: u8,
    /// Hour of day (UTC) at which the daily payout batch runs
    pub payout_hour_utc: u8,
    /// Failed payout attempts after which an entry needs manual reconciliation
    pub payout_max_attempts: u32,
    /// ISO 4217 settlement currency handed to the payout provider
    pub payout_currency: String,
    /// Per-request timeout for allocator and ledger operations
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a variable is present but unparseable, or when
    /// the parsed configuration fails [`Self::validate`].
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        // Load .env file if it exists
        if let Err(e) = dotenvy::dotenv() {
            warn!("No .env file found or failed to load: {}", e);
        }

        let config = Self {
            database_url: DatabaseUrl::parse_url(&env_config::database_url())
                .context("Invalid DATABASE_URL value")?,
            log_level: LogLevel::from_str_or_default(&env_config::log_level()),
            partial_payment_percent: env_var_or(
                "PARTIAL_PAYMENT_PERCENT",
                &defaults::PARTIAL_PAYMENT_PERCENT.to_string(),
            )?
            .parse()
            .context("Invalid PARTIAL_PAYMENT_PERCENT value")?,
            payout_hour_utc: env_var_or("PAYOUT_HOUR_UTC", &defaults::PAYOUT_HOUR_UTC.to_string())?
                .parse()
                .context("Invalid PAYOUT_HOUR_UTC value")?,
            payout_max_attempts: env_var_or(
                "PAYOUT_MAX_ATTEMPTS",
                &defaults::PAYOUT_MAX_ATTEMPTS.to_string(),
            )?
            .parse()
            .context("Invalid PAYOUT_MAX_ATTEMPTS value")?,
            payout_currency: env_config::payout_currency(),
            request_timeout: Duration::from_secs(
                env_var_or(
                    "REQUEST_TIMEOUT_SECS",
                    &defaults::REQUEST_TIMEOUT_SECS.to_string(),
                )?
                .parse()
                .context("Invalid REQUEST_TIMEOUT_SECS value")?,
            ),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    ///
    /// # Errors
    ///
    /// Returns an error when any knob is outside its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.partial_payment_percent == 0 || self.partial_payment_percent > 100 {
            return Err(anyhow::anyhow!(
                "PARTIAL_PAYMENT_PERCENT must be between 1 and 100, got {}",
                self.partial_payment_percent
            ));
        }

        if self.payout_hour_utc > 23 {
            return Err(anyhow::anyhow!(
                "PAYOUT_HOUR_UTC must be between 0 and 23, got {}",
                self.payout_hour_utc
            ));
        }

        if self.payout_max_attempts == 0 {
            return Err(anyhow::anyhow!("PAYOUT_MAX_ATTEMPTS must be at least 1"));
        }

        if self.payout_currency.len() != 3
            || !self
                .payout_currency
                .chars()
                .all(|c| c.is_ascii_uppercase())
        {
            return Err(anyhow::anyhow!(
                "PAYOUT_CURRENCY must be a 3-letter ISO 4217 code, got {:?}",
                self.payout_currency
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be at least 1"));
        }

        Ok(())
    }

    /// Get a summary of the configuration for logging
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Marcel Booking Engine Configuration:\n\
             - Database: {}\n\
             - Log Level: {}\n\
             - Partial Payment Threshold: {}%\n\
             - Payout Hour (UTC): {:02}:00\n\
             - Payout Max Attempts: {}\n\
             - Payout Currency: {}\n\
             - Request Timeout: {}s",
            self.database_url,
            self.log_level,
            self.partial_payment_percent,
            self.payout_hour_utc,
            self.payout_max_attempts,
            self.payout_currency,
            self.request_timeout.as_secs(),
        )
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DatabaseUrl::default(),
            log_level: LogLevel::default(),
            partial_payment_percent: defaults::PARTIAL_PAYMENT_PERCENT,
            payout_hour_utc: defaults::PAYOUT_HOUR_UTC,
            payout_max_attempts: defaults::PAYOUT_MAX_ATTEMPTS,
            payout_currency: defaults::PAYOUT_CURRENCY.to_string(),
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Get environment variable with default fallback
fn env_var_or(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from_str_or_default("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str_or_default("WARN"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_or_default("nonsense"), LogLevel::Info);
    }

    #[test]
    fn test_database_url_parsing() {
        assert!(DatabaseUrl::parse_url("sqlite::memory:").unwrap().is_memory());

        let file = DatabaseUrl::parse_url("sqlite:./data/bookings.db").unwrap();
        assert_eq!(file.to_connection_string(), "sqlite:./data/bookings.db");

        let bare = DatabaseUrl::parse_url("./bookings.db").unwrap();
        assert_eq!(bare.to_connection_string(), "sqlite:./bookings.db");

        assert!(DatabaseUrl::parse_url("postgresql://localhost/app").is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.partial_payment_percent = 0;
        assert!(config.validate().is_err());
        config.partial_payment_percent = 101;
        assert!(config.validate().is_err());
        config.partial_payment_percent = 100;
        assert!(config.validate().is_ok());

        config.payout_hour_utc = 24;
        assert!(config.validate().is_err());
        config.payout_hour_utc = 23;
        assert!(config.validate().is_ok());

        config.payout_currency = "inr".to_string();
        assert!(config.validate().is_err());
        config.payout_currency = "EURO".to_string();
        assert!(config.validate().is_err());
        config.payout_currency = "EUR".to_string();
        assert!(config.validate().is_ok());
    }
}
