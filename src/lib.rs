// ABOUTME: Main library entry point for the Marcel booking and settlement engine
// ABOUTME: Exposes slot allocation, the payment ledger, and payout batching as async services
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

#![deny(unsafe_code)]

//! # Marcel Booking Core
//!
//! The booking allocation and payment-settlement engine behind the Marcel
//! salon platform. HTTP surfaces, notifications, and search live elsewhere;
//! this crate owns the money- and slot-correctness of the system.
//!
//! ## Components
//!
//! - **Availability Resolver**: computes a store's (or one employee's)
//!   bookable windows for a date from weekly schedules
//! - **Slot Allocator**: validates and reserves slots; under concurrency
//!   exactly one of N racing requests for a slot wins
//! - **Payment Ledger**: append-only captures and refunds with a
//!   materialized, always-consistent paid amount per booking
//! - **Payout Batcher**: daily per-owner aggregation of settled balances
//!   into idempotent provider transfers
//!
//! All money is carried as `i64` integer minor units (paise); no monetary
//! value ever passes through floating point.
//!
//! ## Example
//!
//! ```rust,no_run
//! use marcel_booking_core::config::EngineConfig;
//! use marcel_booking_core::database::Database;
//! use marcel_booking_core::booking::SlotAllocator;
//! use marcel_booking_core::errors::AppResult;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = EngineConfig::from_env()?;
//!     let database = Arc::new(Database::new(&config.database_url.to_connection_string()).await?);
//!     let _allocator = SlotAllocator::new(database, config);
//!     Ok(())
//! }
//! ```

/// Availability window resolution from weekly schedules
pub mod availability;

/// Slot allocation and booking lifecycle
pub mod booking;

/// Environment-backed engine configuration
pub mod config;

/// Application constants grouped by domain
pub mod constants;

/// SQLite storage: catalog, bookings, and the payment ledger
pub mod database;

/// Unified error types with stable codes
pub mod errors;

/// Structured logging setup
pub mod logging;

/// Core data models and status state machines
pub mod models;

/// Capture and refund processing over the append-only ledger
pub mod payments;

/// Per-owner payout batching with idempotent provider transfers
pub mod payouts;
