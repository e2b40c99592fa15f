// ABOUTME: Payment ledger business logic: capture and refund over append-only entries
// ABOUTME: Booking paid_minor is recomputed from the ledger inside the same transaction

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Payment Ledger
//!
//! Records money captured against and refunded for bookings. Every movement
//! is an immutable [`LedgerEntry`]; the booking's `paid_minor` column is a
//! materialized view recomputed from the ledger sum inside the same
//! transaction that appends the entry, so the two can never drift.
//!
//! Status derivation after every movement:
//!
//! - paid equal to the total price: `payment_status = full`
//! - paid at or above the configured partial threshold: `partial`
//! - a refund driving paid to zero: `refunded`
//! - a capture that lifts a `pending` booking over the threshold confirms it
//!
//! Refunds never silently net against money that already left in a payout
//! batch: a refund exceeding the booking's still-pending captured value is
//! rejected as `PayoutReconciliationRequired` for out-of-band handling.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::limits;
use crate::database::transactions::{retry_transaction, TransactionGuard};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::models::{
    Booking, BookingStatus, EntryDirection, LedgerEntry, PaymentStatus, PayoutStatus,
};

/// Derive the payment status from the ledger-backed paid amount
fn derive_payment_status(
    paid_minor: i64,
    total_minor: i64,
    threshold_percent: u8,
    direction: EntryDirection,
) -> PaymentStatus {
    if paid_minor == 0 {
        return if matches!(direction, EntryDirection::Refund) {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::Pending
        };
    }
    if paid_minor == total_minor {
        return PaymentStatus::Full;
    }
    if paid_minor * 100 >= total_minor * i64::from(threshold_percent) {
        return PaymentStatus::Partial;
    }
    PaymentStatus::Pending
}

/// Derive the booking lifecycle status after a ledger movement
///
/// Only a capture that lifts a pending booking over the threshold changes
/// anything; refunds leave the lifecycle alone (cancellation is explicit).
fn derive_booking_status(
    current: BookingStatus,
    paid_minor: i64,
    total_minor: i64,
    threshold_percent: u8,
    direction: EntryDirection,
) -> BookingStatus {
    let threshold_reached =
        paid_minor > 0 && paid_minor * 100 >= total_minor * i64::from(threshold_percent);
    if matches!(direction, EntryDirection::Capture)
        && current == BookingStatus::Pending
        && threshold_reached
    {
        BookingStatus::Confirmed
    } else {
        current
    }
}

/// Applies captures and refunds to bookings through the append-only ledger
#[derive(Clone)]
pub struct PaymentLedger {
    database: Arc<Database>,
    config: EngineConfig,
}

impl PaymentLedger {
    /// Create a new ledger service over the given database
    #[must_use]
    pub const fn new(database: Arc<Database>, config: EngineConfig) -> Self {
        Self { database, config }
    }

    /// Record money captured against a booking
    ///
    /// # Errors
    ///
    /// `InvalidInput` for non-positive amounts, `ResourceNotFound` for
    /// unknown bookings, `BookingNotPayable` on cancelled bookings,
    /// `OverPayment` when the capture would exceed the total price,
    /// `Timeout`, or a database error.
    pub async fn apply_capture(&self, booking_id: Uuid, amount_minor: i64) -> AppResult<Booking> {
        let timeout_secs = self.config.request_timeout.as_secs();
        tokio::time::timeout(
            self.config.request_timeout,
            self.apply_entry(booking_id, amount_minor, EntryDirection::Capture),
        )
        .await
        .map_err(|_| AppError::timeout("apply_capture", timeout_secs))?
    }

    /// Record money returned to the customer for a booking
    ///
    /// # Errors
    ///
    /// `InvalidInput` for non-positive amounts, `ResourceNotFound` for
    /// unknown bookings, `RefundExceedsPaid` when the refund exceeds the paid
    /// amount, `PayoutReconciliationRequired` when it exceeds the booking's
    /// not-yet-paid-out captured value, `Timeout`, or a database error.
    pub async fn apply_refund(&self, booking_id: Uuid, amount_minor: i64) -> AppResult<Booking> {
        let timeout_secs = self.config.request_timeout.as_secs();
        tokio::time::timeout(
            self.config.request_timeout,
            self.apply_entry(booking_id, amount_minor, EntryDirection::Refund),
        )
        .await
        .map_err(|_| AppError::timeout("apply_refund", timeout_secs))?
    }

    async fn apply_entry(
        &self,
        booking_id: Uuid,
        amount_minor: i64,
        direction: EntryDirection,
    ) -> AppResult<Booking> {
        if amount_minor <= 0 {
            return Err(AppError::invalid_input(format!(
                "Amount must be positive, got {amount_minor}"
            )));
        }

        // Resolve the owner the movement is attributed to; store ownership
        // never changes mid-flight, so this read can precede the transaction
        let existing = self
            .database
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking {booking_id}")))?;
        let store = self
            .database
            .get_store(existing.store_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Store {}", existing.store_id)))?;
        let owner_id = store.owner_id;

        let updated = retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);

                let booking = Database::get_booking_tx(guard.executor()?, booking_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Booking {booking_id}")))?;

                let entries =
                    Database::entries_for_booking_tx(guard.executor()?, booking_id).await?;
                let paid: i64 = entries
                    .iter()
                    .map(|e| e.direction.signed_amount(e.amount_minor))
                    .sum();

                if booking.paid_minor != paid {
                    warn!(
                        booking_id = %booking_id,
                        materialized = booking.paid_minor,
                        derived = paid,
                        "Materialized paid amount diverged from ledger; ledger wins"
                    );
                }

                match direction {
                    EntryDirection::Capture => {
                        if booking.status == BookingStatus::Cancelled {
                            return Err(AppError::booking_not_payable(format!(
                                "Booking {booking_id} is cancelled"
                            ))
                            .with_booking_id(booking_id));
                        }
                        if paid + amount_minor > booking.total_price_minor {
                            return Err(AppError::over_payment(
                                paid,
                                amount_minor,
                                booking.total_price_minor,
                            )
                            .with_booking_id(booking_id));
                        }
                    }
                    EntryDirection::Refund => {
                        if amount_minor > paid {
                            return Err(AppError::refund_exceeds_paid(paid, amount_minor)
                                .with_booking_id(booking_id));
                        }
                        // Money already selected into a batch or paid out
                        // cannot be refunded from here
                        let pending_pool: i64 = entries
                            .iter()
                            .filter(|e| e.payout_status == PayoutStatus::Pending)
                            .map(|e| e.direction.signed_amount(e.amount_minor))
                            .sum();
                        if amount_minor > pending_pool {
                            return Err(AppError::payout_reconciliation_required(format!(
                                "Refund of {amount_minor} exceeds the not-yet-paid-out \
                                 balance {pending_pool} of booking {booking_id}"
                            ))
                            .with_booking_id(booking_id)
                            .with_owner_id(owner_id));
                        }
                    }
                    EntryDirection::Payout => {
                        return Err(AppError::internal(
                            "Payout entries are appended by the batcher, not the ledger service",
                        ));
                    }
                }

                let now = Utc::now();
                let entry = LedgerEntry {
                    id: Uuid::new_v4(),
                    booking_id: Some(booking_id),
                    owner_id,
                    direction,
                    amount_minor,
                    payout_status: PayoutStatus::Pending,
                    payout_batch_ref: None,
                    payout_reference: None,
                    payout_attempts: 0,
                    created_at: now,
                };
                Database::insert_ledger_entry_tx(guard.executor()?, &entry).await?;

                let new_paid = paid + direction.signed_amount(amount_minor);
                let payment_status = derive_payment_status(
                    new_paid,
                    booking.total_price_minor,
                    self.config.partial_payment_percent,
                    direction,
                );
                let status = derive_booking_status(
                    booking.status,
                    new_paid,
                    booking.total_price_minor,
                    self.config.partial_payment_percent,
                    direction,
                );

                Database::update_booking_payment_tx(
                    guard.executor()?,
                    booking_id,
                    new_paid,
                    payment_status,
                    status,
                    now,
                )
                .await?;
                guard.commit().await?;

                Ok(Booking {
                    paid_minor: new_paid,
                    payment_status,
                    status,
                    updated_at: now,
                    ..booking
                })
            },
            limits::MAX_TXN_RETRIES,
        )
        .await?;

        AppLogger::log_ledger_event(
            &booking_id.to_string(),
            direction.as_str(),
            amount_minor,
            updated.payment_status.as_str(),
        );

        Ok(updated)
    }
}
