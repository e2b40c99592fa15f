// ABOUTME: Slot allocation business logic: validation funnel plus atomic reservation
// ABOUTME: Exactly one of N racing requests for a slot wins; losers see SlotUnavailable

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Slot Allocator
//!
//! Turns a [`SlotRequest`] into a stored [`Booking`] or a specific rejection:
//!
//! - `ResourceNotFound` when the service does not exist
//! - `ServiceInactive` when the service is switched off
//! - `OutsideHours` when the requested interval does not fit a resolved
//!   availability window (including slots that would cross midnight)
//! - `SlotUnavailable` when a conflicting booking holds the slot
//!
//! The conflict check and the insert execute as one conditional statement
//! inside a transaction, so under concurrency exactly one request wins and
//! the rest observe `SlotUnavailable`. Lost races are not retried here; the
//! caller decides whether to offer another slot.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::availability::AvailabilityResolver;
use crate::config::EngineConfig;
use crate::constants::limits;
use crate::database::transactions::{retry_transaction, TransactionGuard};
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::models::{Booking, BookingStatus, PaymentStatus, SlotRequest};

/// Allocates booking slots atomically against the availability schedule
#[derive(Clone)]
pub struct SlotAllocator {
    database: Arc<Database>,
    resolver: AvailabilityResolver,
    config: EngineConfig,
}

impl SlotAllocator {
    /// Create a new allocator over the given database
    #[must_use]
    pub fn new(database: Arc<Database>, config: EngineConfig) -> Self {
        let resolver = AvailabilityResolver::new(Arc::clone(&database));
        Self {
            database,
            resolver,
            config,
        }
    }

    /// The resolver this allocator consults
    #[must_use]
    pub const fn resolver(&self) -> &AvailabilityResolver {
        &self.resolver
    }

    /// Reserve a slot, or fail with the specific rejection
    ///
    /// On success the booking is stored with `status = pending`,
    /// `payment_status = pending`, `paid_minor = 0`, and the service price
    /// snapshotted into `total_price_minor`.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound`, `ServiceInactive`, `OutsideHours`,
    /// `SlotUnavailable`, `InvalidInput`, `Timeout`, or a database error.
    pub async fn book_slot(&self, request: SlotRequest) -> AppResult<Booking> {
        let timeout_secs = self.config.request_timeout.as_secs();
        tokio::time::timeout(self.config.request_timeout, self.book_slot_inner(request))
            .await
            .map_err(|_| AppError::timeout("book_slot", timeout_secs))?
    }

    async fn book_slot_inner(&self, request: SlotRequest) -> AppResult<Booking> {
        let service = self
            .database
            .get_store_service(request.store_service_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Service {}", request.store_service_id)))?;

        if service.store_id != request.store_id {
            return Err(AppError::invalid_input(format!(
                "Service {} does not belong to store {}",
                service.id, request.store_id
            )));
        }
        if !service.is_active {
            return Err(AppError::service_inactive(service.id));
        }
        if service.duration_minutes > limits::MAX_SERVICE_DURATION_MINUTES {
            return Err(AppError::invalid_input(format!(
                "Service duration {} minutes exceeds the bookable maximum",
                service.duration_minutes
            )));
        }

        // Schedules are within-day; a slot that would wrap past midnight can
        // never fit a window
        let duration = chrono::Duration::minutes(i64::from(service.duration_minutes));
        let (end_time, wrapped_secs) = request.start_time.overflowing_add_signed(duration);
        if wrapped_secs != 0 {
            return Err(AppError::outside_hours(format!(
                "Slot starting {} would cross midnight",
                request.start_time
            )));
        }

        let windows = self
            .resolver
            .resolve_windows(request.store_id, request.employee_id, request.date)
            .await?;
        if !windows
            .iter()
            .any(|window| window.contains(request.start_time, end_time))
        {
            return Err(AppError::outside_hours(format!(
                "No availability covering {} to {} on {}",
                request.start_time, end_time, request.date
            )));
        }

        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            customer_id: request.customer_id,
            store_id: request.store_id,
            store_service_id: service.id,
            employee_id: request.employee_id,
            booking_date: request.date,
            start_time: request.start_time,
            end_time,
            total_price_minor: service.price_minor,
            paid_minor: 0,
            payment_status: PaymentStatus::Pending,
            status: BookingStatus::Pending,
            notes: request.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);

                let inserted = Database::try_insert_booking_tx(guard.executor()?, &booking).await?;
                if !inserted {
                    // A conflicting booking holds the slot; drop the guard to
                    // roll back
                    return Err(AppError::slot_unavailable(format!(
                        "Slot {} {}-{} at store {} is taken",
                        booking.booking_date,
                        booking.start_time,
                        booking.end_time,
                        booking.store_id
                    ))
                    .with_booking_id(booking.id));
                }

                guard.commit().await
            },
            limits::MAX_TXN_RETRIES,
        )
        .await?;

        info!(
            booking_id = %booking.id,
            store_id = %booking.store_id,
            employee_id = ?booking.employee_id,
            date = %booking.booking_date,
            start = %booking.start_time,
            end = %booking.end_time,
            total_price_minor = booking.total_price_minor,
            "Booked slot"
        );
        AppLogger::log_booking_event(
            &booking.id.to_string(),
            &booking.store_id.to_string(),
            "created",
            true,
        );

        Ok(booking)
    }

    /// Cancel a booking, releasing its slot
    ///
    /// Cancelled bookings no longer participate in conflict checks, so the
    /// freed interval is immediately bookable again.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for unknown ids, `InvalidInput` when the booking is
    /// already in a terminal state, or a database error.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.transition_booking(booking_id, BookingStatus::Cancelled, "cancelled")
            .await
    }

    /// Mark a booking's service as rendered
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for unknown ids, `InvalidInput` when the booking is
    /// already in a terminal state, or a database error.
    pub async fn complete_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.transition_booking(booking_id, BookingStatus::Completed, "completed")
            .await
    }

    /// Fetch a booking
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for unknown ids, or a database error.
    pub async fn get_booking(&self, booking_id: Uuid) -> AppResult<Booking> {
        self.database
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Booking {booking_id}")))
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        target: BookingStatus,
        event: &str,
    ) -> AppResult<Booking> {
        let booking = retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);

                let booking = Database::get_booking_tx(guard.executor()?, booking_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(format!("Booking {booking_id}")))?;

                if booking.status.is_terminal() {
                    return Err(AppError::invalid_input(format!(
                        "Booking {booking_id} is already {}",
                        booking.status
                    ))
                    .with_booking_id(booking_id));
                }

                let now = Utc::now();
                Database::update_booking_status_tx(guard.executor()?, booking_id, target, now)
                    .await?;
                guard.commit().await?;

                Ok(Booking {
                    status: target,
                    updated_at: now,
                    ..booking
                })
            },
            limits::MAX_TXN_RETRIES,
        )
        .await?;

        AppLogger::log_booking_event(
            &booking.id.to_string(),
            &booking.store_id.to_string(),
            event,
            true,
        );

        Ok(booking)
    }
}
