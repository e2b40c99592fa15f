// ABOUTME: Core data models for the Marcel booking and settlement engine
// ABOUTME: Defines Store, Booking, LedgerEntry and the status state machines around them
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Data Models
//!
//! This module contains the core data structures shared by the availability
//! resolver, slot allocator, payment ledger, and payout batcher.
//!
//! ## Design Principles
//!
//! - **Fixed-point money**: every amount is an `i64` in minor units (paise);
//!   monetary arithmetic never goes through floating point
//! - **String-mapped enums**: status enums round-trip through stable strings
//!   for database storage
//! - **Snapshot pricing**: a booking's total price is copied from the service
//!   at creation time and never recalculated
//! - **Append-only ledger**: `paid_minor` on a booking is a materialized view
//!   over ledger entries, updated in the same transaction that appends them

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Booking lifecycle status
///
/// Created as `Pending` by the slot allocator; `Confirmed` once the payment
/// ledger sees the partial-payment threshold reached; `Completed` and
/// `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum BookingStatus {
    /// Slot reserved, below the payment threshold
    #[default]
    Pending,
    /// Payment threshold reached
    Confirmed,
    /// Service was rendered (terminal)
    Completed,
    /// Explicitly cancelled; the slot becomes available again (terminal)
    Cancelled,
}

impl BookingStatus {
    /// Terminal states accept no further lifecycle transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Display for BookingStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(AppError::invalid_input(format!("Invalid booking status: {s}")).into()),
        }
    }
}

/// Payment status derived from the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum PaymentStatus {
    /// Nothing paid, or paid amount still below the partial threshold
    #[default]
    Pending,
    /// Paid amount at or above the partial threshold but below the total
    Partial,
    /// Paid amount equals the total price
    Full,
    /// A refund drove the paid amount back to zero
    Refunded,
}

impl PaymentStatus {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Full => "full",
            Self::Refunded => "refunded",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "full" => Ok(Self::Full),
            "refunded" => Ok(Self::Refunded),
            _ => Err(AppError::invalid_input(format!("Invalid payment status: {s}")).into()),
        }
    }
}

/// Payout lifecycle of a ledger entry
///
/// `Inflight` is the crash-safety intermediate state: entries are moved there
/// before the external payout call and finalized to `PaidOut` (or rolled back
/// to `Pending`) once the provider answers. The payout batcher is the only
/// writer of `Inflight` and `PaidOut` transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum PayoutStatus {
    /// Eligible for the next payout batch
    #[default]
    Pending,
    /// Selected by a batch whose external call is in progress
    Inflight,
    /// Paid out to the owner; carries the provider reference
    PaidOut,
}

impl PayoutStatus {
    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Inflight => "inflight",
            Self::PaidOut => "paidout",
        }
    }
}

impl Display for PayoutStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayoutStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "inflight" => Ok(Self::Inflight),
            "paidout" => Ok(Self::PaidOut),
            _ => Err(AppError::invalid_input(format!("Invalid payout status: {s}")).into()),
        }
    }
}

/// Direction of a monetary movement recorded in the ledger
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    /// Money captured against a booking
    Capture,
    /// Money returned to the customer
    Refund,
    /// Aggregate transfer to an owner's bank account
    Payout,
}

impl EntryDirection {
    /// Signed contribution of an entry to an unsettled balance.
    ///
    /// Captures add, refunds subtract, and payout records contribute nothing
    /// (they document money that already left the pending pool). Every
    /// summation in the ledger goes through this single exhaustive match.
    #[must_use]
    pub const fn signed_amount(&self, amount_minor: i64) -> i64 {
        match self {
            Self::Capture => amount_minor,
            Self::Refund => -amount_minor,
            Self::Payout => 0,
        }
    }

    /// Convert to string for database storage
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Capture => "capture",
            Self::Refund => "refund",
            Self::Payout => "payout",
        }
    }
}

impl Display for EntryDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capture" => Ok(Self::Capture),
            "refund" => Ok(Self::Refund),
            "payout" => Ok(Self::Payout),
            _ => Err(AppError::invalid_input(format!("Invalid entry direction: {s}")).into()),
        }
    }
}

/// A half-open `[start, end)` interval within one day
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive start of the window
    pub start: NaiveTime,
    /// Exclusive end of the window
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Create a window; callers are expected to pass `start < end`
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `[start, end)` wholly contains the given interval
    #[must_use]
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start <= start && end <= self.end
    }

    /// Half-open overlap test: `[a, b)` and `[c, d)` conflict iff `a < d && c < b`
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A shop owner; the payout destination for their stores' revenue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    /// Unique owner ID
    pub id: Uuid,
    /// Display name
    pub display_name: String,
    /// Opaque bank account reference handed to the payout provider
    pub bank_account_ref: String,
    /// When the owner was registered
    pub created_at: DateTime<Utc>,
}

/// A store offering services at a physical location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Store {
    /// Unique store ID
    pub id: Uuid,
    /// Owning owner
    pub owner_id: Uuid,
    /// Store name
    pub name: String,
    /// Free-text location
    pub location: String,
    /// When the store was registered
    pub created_at: DateTime<Utc>,
}

/// Weekly-recurring opening hours for a store
///
/// One row per `(store, day_of_week)` window; multiple rows per day are
/// allowed and are coalesced by the availability resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAvailability {
    /// Unique row ID
    pub id: Uuid,
    /// Store this window belongs to
    pub store_id: Uuid,
    /// Day of week, Sunday = 0 through Saturday = 6
    pub day_of_week: u8,
    /// Opening time
    pub opens_at: NaiveTime,
    /// Closing time (exclusive)
    pub closes_at: NaiveTime,
    /// Inactive rows are ignored by the resolver
    pub is_active: bool,
}

/// A priced service offered by a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreService {
    /// Unique service ID
    pub id: Uuid,
    /// Store offering the service
    pub store_id: Uuid,
    /// Service name (e.g. "haircut")
    pub service_name: String,
    /// Price in minor units (paise)
    pub price_minor: i64,
    /// Duration of one appointment in minutes
    pub duration_minutes: u32,
    /// Inactive services cannot be booked
    pub is_active: bool,
    /// When the service was added
    pub created_at: DateTime<Utc>,
}

/// An employee who can be assigned to stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    /// Unique employee ID
    pub id: Uuid,
    /// Display name
    pub display_name: String,
    /// When the employee was registered
    pub created_at: DateTime<Utc>,
}

/// Assignment of an employee to a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEmployee {
    /// Unique assignment ID
    pub id: Uuid,
    /// Store side of the assignment
    pub store_id: Uuid,
    /// Employee side of the assignment
    pub employee_id: Uuid,
    /// Role at this store (e.g. "stylist")
    pub role: String,
    /// Inactive assignments are ignored
    pub is_active: bool,
    /// When the employee joined the store
    pub joined_at: DateTime<Utc>,
    /// When the employee left, if they have
    pub left_at: Option<DateTime<Utc>>,
}

/// Weekly-recurring working hours of an employee at one store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeAvailability {
    /// Unique row ID
    pub id: Uuid,
    /// Employee this window belongs to
    pub employee_id: Uuid,
    /// Store the window is scoped to
    pub store_id: Uuid,
    /// Day of week, Sunday = 0 through Saturday = 6
    pub day_of_week: u8,
    /// Shift start
    pub starts_at: NaiveTime,
    /// Shift end (exclusive)
    pub ends_at: NaiveTime,
    /// Inactive rows are ignored by the resolver
    pub is_active: bool,
}

/// A reserved time slot with its payment state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking ID
    pub id: Uuid,
    /// Customer who reserved the slot (pre-authenticated identity)
    pub customer_id: Uuid,
    /// Store the slot is at
    pub store_id: Uuid,
    /// Service being booked; the price was snapshotted from it
    pub store_service_id: Uuid,
    /// Requested employee, if any
    pub employee_id: Option<Uuid>,
    /// Calendar date of the slot
    pub booking_date: NaiveDate,
    /// Slot start
    pub start_time: NaiveTime,
    /// Slot end, always `start_time + service duration`
    pub end_time: NaiveTime,
    /// Total price in minor units, snapshotted at creation
    pub total_price_minor: i64,
    /// Amount paid so far; materialized from the ledger, `0 ≤ paid ≤ total`
    pub paid_minor: i64,
    /// Payment status derived from `paid_minor`
    pub payment_status: PaymentStatus,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Free-text notes from the customer
    pub notes: Option<String>,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The booked interval as a window
    #[must_use]
    pub const fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }
}

/// An immutable ledger entry recording one monetary movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID
    pub id: Uuid,
    /// Booking the movement is attributed to; `None` for payout records,
    /// which aggregate across bookings
    pub booking_id: Option<Uuid>,
    /// Owner who is owed (capture), charged back (refund), or paid (payout)
    pub owner_id: Uuid,
    /// Movement direction
    pub direction: EntryDirection,
    /// Absolute amount in minor units, always positive; the sign lives in
    /// [`EntryDirection::signed_amount`]
    pub amount_minor: i64,
    /// Payout lifecycle of this entry
    pub payout_status: PayoutStatus,
    /// Batch that selected this entry; doubles as the provider idempotency key
    pub payout_batch_ref: Option<Uuid>,
    /// Provider reference stored once the payout succeeded
    pub payout_reference: Option<String>,
    /// Consecutive failed payout attempts for this entry
    pub payout_attempts: u32,
    /// When the entry was appended
    pub created_at: DateTime<Utc>,
}

/// A slot reservation request handed to the slot allocator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRequest {
    /// Customer making the reservation
    pub customer_id: Uuid,
    /// Store to book at
    pub store_id: Uuid,
    /// Service to book
    pub store_service_id: Uuid,
    /// Specific employee, or `None` for a store-level (staff-agnostic) slot
    pub employee_id: Option<Uuid>,
    /// Calendar date
    pub date: NaiveDate,
    /// Requested start time
    pub start_time: NaiveTime,
    /// Free-text notes
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_status_round_trips() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Partial,
            PaymentStatus::Full,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        for status in [
            PayoutStatus::Pending,
            PayoutStatus::Inflight,
            PayoutStatus::PaidOut,
        ] {
            assert_eq!(status.as_str().parse::<PayoutStatus>().unwrap(), status);
        }
        assert!("definitely-not-a-status".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_signed_amounts() {
        assert_eq!(EntryDirection::Capture.signed_amount(500), 500);
        assert_eq!(EntryDirection::Refund.signed_amount(500), -500);
        assert_eq!(EntryDirection::Payout.signed_amount(500), 0);
    }

    #[test]
    fn test_window_contains_and_overlaps() {
        let window = TimeWindow::new(t(9, 0), t(17, 0));
        assert!(window.contains(t(9, 0), t(10, 0)));
        assert!(window.contains(t(16, 0), t(17, 0)));
        assert!(!window.contains(t(16, 30), t(17, 30)));

        // Half-open: back-to-back intervals do not overlap
        let morning = TimeWindow::new(t(9, 0), t(10, 0));
        let next = TimeWindow::new(t(10, 0), t(11, 0));
        assert!(!morning.overlaps(&next));
        let overlapping = TimeWindow::new(t(9, 30), t(10, 30));
        assert!(morning.overlaps(&overlapping));
    }
}
