// ABOUTME: Transaction management with an RAII guard and retry backoff for SQLite
// ABOUTME: Guard rolls back automatically on drop; retry absorbs busy and locked aborts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! Transaction management with RAII guards and retry patterns
//!
//! - [`TransactionGuard`]: wraps a `sqlx` transaction; rolls back on drop
//!   unless explicitly committed
//! - [`retry_transaction`]: exponential backoff for transient SQLite aborts
//!   ("database is locked", busy timeouts); everything else propagates
//!   immediately
//!
//! The service layer wraps every multi-statement write in a guard and, for
//! contended paths, in `retry_transaction`. Business rejections map to
//! non-retryable [`AppError`] kinds and are never retried here.

use std::future::Future;
use std::time::Duration;

use sqlx::{Sqlite, SqliteConnection, Transaction};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::constants::limits;
use crate::errors::{AppError, AppResult};

/// Retry a transactional operation on transient SQLite failures
///
/// Backoff doubles per attempt starting from
/// [`limits::TXN_RETRY_BASE_MS`]. Non-retryable errors (constraint
/// violations, business rejections) propagate on the first failure.
///
/// # Errors
///
/// Returns the last error once `max_retries` attempts are exhausted, or the
/// first non-retryable error.
pub async fn retry_transaction<F, Fut, T>(mut f: F, max_retries: u32) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempts = 0;
    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempts += 1;
                if attempts >= max_retries {
                    error!(
                        attempts = attempts,
                        max_retries = max_retries,
                        error = %e,
                        "Transaction failed after max retries"
                    );
                    return Err(e);
                }

                if e.is_retryable_database_error() {
                    let backoff_ms = limits::TXN_RETRY_BASE_MS * (1 << attempts);
                    warn!(
                        attempt = attempts,
                        backoff_ms = backoff_ms,
                        error = %e,
                        "Transaction hit a transient database error, retrying after backoff"
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
}

impl AppError {
    /// Whether this error stems from a transient SQLite abort worth retrying
    ///
    /// Retryable: "database is locked", busy timeouts, snapshot aborts.
    /// Constraint violations and every business rejection are not.
    #[must_use]
    pub fn is_retryable_database_error(&self) -> bool {
        if !matches!(
            self.code,
            crate::errors::ErrorCode::DatabaseError | crate::errors::ErrorCode::InternalError
        ) {
            return false;
        }

        let message = format!("{self:?}").to_lowercase();

        if message.contains("unique constraint")
            || message.contains("foreign key constraint")
            || message.contains("check constraint")
            || message.contains("not null constraint")
        {
            return false;
        }

        message.contains("database is locked")
            || message.contains("database table is locked")
            || message.contains("busy")
            || message.contains("timed out")
    }
}

/// RAII guard for SQLite transactions ensuring automatic rollback on drop
///
/// Wraps a `sqlx` [`Transaction`] and provides a type-safe commit that
/// consumes the guard. If the guard is dropped before `commit()`, `sqlx`
/// rolls the transaction back.
pub struct TransactionGuard<'c> {
    transaction: Option<Transaction<'c, Sqlite>>,
    committed: bool,
}

impl<'c> TransactionGuard<'c> {
    /// Create a guard from a transaction obtained via `pool.begin()`
    #[must_use]
    pub fn new(transaction: Transaction<'c, Sqlite>) -> Self {
        debug!("TransactionGuard created - transaction will auto-rollback if not committed");
        Self {
            transaction: Some(transaction),
            committed: false,
        }
    }

    /// Commit the transaction and consume the guard
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails or the guard was already consumed.
    pub async fn commit(mut self) -> AppResult<()> {
        match self.transaction.take() {
            Some(tx) => {
                tx.commit()
                    .await
                    .map_err(|e| AppError::database(format!("Transaction commit failed: {e}")))?;
                self.committed = true;
                debug!("TransactionGuard committed successfully");
                Ok(())
            }
            None => Err(AppError::internal(
                "Transaction already consumed - cannot commit",
            )),
        }
    }

    /// Explicitly roll back the transaction and consume the guard
    ///
    /// Dropping the guard rolls back too; this variant surfaces rollback
    /// failures to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback fails or the guard was already consumed.
    pub async fn rollback(mut self) -> AppResult<()> {
        match self.transaction.take() {
            Some(tx) => {
                tx.rollback()
                    .await
                    .map_err(|e| AppError::database(format!("Transaction rollback failed: {e}")))?;
                debug!("TransactionGuard rolled back explicitly");
                Ok(())
            }
            None => Err(AppError::internal(
                "Transaction already consumed - cannot rollback",
            )),
        }
    }

    /// Whether the transaction has been committed
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.committed
    }

    /// Mutable connection for executing queries inside the transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the guard was already committed or rolled back.
    pub fn executor(&mut self) -> AppResult<&mut SqliteConnection> {
        self.transaction.as_deref_mut().ok_or_else(|| {
            AppError::internal("Transaction already consumed - guard used after commit/rollback")
        })
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if self.transaction.is_some() && !self.committed {
            // sqlx rolls the inner transaction back on drop; log it so
            // abandoned writes are visible in traces
            warn!("TransactionGuard dropped without commit - transaction rolls back");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::AppError;

    #[test]
    fn test_locked_errors_are_retryable() {
        let locked = AppError::database("database is locked");
        assert!(locked.is_retryable_database_error());

        let busy = AppError::database("SqliteError { code: 5, message: \"database is busy\" }");
        assert!(busy.is_retryable_database_error());
    }

    #[test]
    fn test_constraint_errors_are_not_retryable() {
        let unique = AppError::database("UNIQUE constraint failed: bookings.id");
        assert!(!unique.is_retryable_database_error());

        let check = AppError::database("CHECK constraint failed: paid_minor");
        assert!(!check.is_retryable_database_error());
    }

    #[test]
    fn test_business_errors_are_not_retryable() {
        assert!(!AppError::slot_unavailable("slot taken").is_retryable_database_error());
        assert!(!AppError::outside_hours("store closed").is_retryable_database_error());
    }
}
