// ABOUTME: Database management for the booking engine over SQLite via sqlx
// ABOUTME: Owns the connection pool, schema migrations, and per-table operation modules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Database Management
//!
//! This module provides storage for the booking engine: catalog data
//! (owners, stores, services, employees, schedules), bookings, and the
//! append-only payment ledger. Schema migrations run inline at startup.
//!
//! Per-table operations live in submodules; write paths that must be atomic
//! are exposed as `*_tx` functions taking a transaction connection, composed
//! by the service layer under a [`transactions::TransactionGuard`].

mod bookings;
mod catalog;
mod ledger;

/// Transaction guard and retry helpers
pub mod transactions;

pub use ledger::OwnerBatch;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

/// Database manager for catalog, booking, and ledger storage
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Create a new database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or a
    /// migration statement fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        // Ensure SQLite creates the database file if it doesn't exist.
        // In-memory databases are pinned to one pooled connection so every
        // handle sees the same schema.
        let is_memory = database_url.contains(":memory:");
        let connection_options = if database_url.starts_with("sqlite:") && !is_memory {
            format!("{database_url}?mode=rwc")
        } else {
            database_url.to_string()
        };

        let pool = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&connection_options)
                .await?
        } else {
            SqlitePoolOptions::new().connect(&connection_options).await?
        };

        let db = Self { pool };

        db.migrate().await?;

        Ok(db)
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run database migrations
    ///
    /// # Errors
    ///
    /// Returns an error if any table or index creation fails.
    pub async fn migrate(&self) -> Result<()> {
        // Catalog tables
        self.migrate_catalog().await?;

        // Booking tables
        self.migrate_bookings().await?;

        // Ledger tables
        self.migrate_ledger().await?;

        Ok(())
    }
}
