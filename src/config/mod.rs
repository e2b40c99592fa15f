// ABOUTME: Configuration management module for engine settings and parameters
// ABOUTME: Environment-backed config with validation for payments and payout scheduling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! Configuration module
//!
//! Centralized configuration for the booking engine:
//!
//! - **Environment**: engine configuration from environment variables
//!   (database URL, payment threshold, payout schedule, timeouts)

/// Environment and engine configuration
pub mod environment;

pub use environment::{DatabaseUrl, EngineConfig, LogLevel};
