// ABOUTME: Application constants organized by domain
// ABOUTME: Environment-backed configuration getters plus fixed defaults and limits

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! Constants module
//!
//! Groups application constants by domain. Environment-backed values live in
//! [`env_config`]; hard defaults and operational limits in [`defaults`] and
//! [`limits`].

use std::env;

/// Environment-based configuration
pub mod env_config {
    use super::env;
    use super::defaults;

    /// Get database URL from environment or default
    #[must_use]
    pub fn database_url() -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/marcel.db".to_string())
    }

    /// Get log level from environment or default
    #[must_use]
    pub fn log_level() -> String {
        env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    }

    /// Get payout settlement currency from environment or default
    #[must_use]
    pub fn payout_currency() -> String {
        env::var("PAYOUT_CURRENCY").unwrap_or_else(|_| defaults::PAYOUT_CURRENCY.to_string())
    }
}

/// Fixed defaults
pub mod defaults {
    /// Paid fraction (percent of total price) at which a booking confirms
    pub const PARTIAL_PAYMENT_PERCENT: u8 = 50;
    /// Hour of day (UTC) at which the daily payout batch runs
    pub const PAYOUT_HOUR_UTC: u8 = 2;
    /// Failed attempts after which an entry needs manual reconciliation
    pub const PAYOUT_MAX_ATTEMPTS: u32 = 3;
    /// ISO 4217 settlement currency
    pub const PAYOUT_CURRENCY: &str = "INR";
    /// Per-request timeout for allocator and ledger operations
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
}

/// Operational limits
pub mod limits {
    /// Longest bookable appointment, in minutes
    pub const MAX_SERVICE_DURATION_MINUTES: u32 = 8 * 60;
    /// Scheduler wake interval for the payout batcher
    pub const PAYOUT_TICK_SECS: u64 = 3600;
    /// Database busy retries before a transaction is abandoned
    pub const MAX_TXN_RETRIES: u32 = 3;
    /// Base backoff between transaction retries, in milliseconds
    pub const TXN_RETRY_BASE_MS: u64 = 50;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        assert!(defaults::PARTIAL_PAYMENT_PERCENT <= 100);
        assert!(defaults::PAYOUT_HOUR_UTC < 24);
        assert!(defaults::PAYOUT_MAX_ATTEMPTS >= 1);
        assert_eq!(defaults::PAYOUT_CURRENCY.len(), 3);
    }
}
