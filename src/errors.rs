// ABOUTME: Unified error handling for the Marcel booking and settlement engine
// ABOUTME: Defines standard error codes, rich error context, and HTTP status mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Unified Error Handling System
//!
//! This module provides a centralized error handling system for the booking
//! core. It defines the error kinds surfaced by the slot allocator, payment
//! ledger, and payout batcher, plus HTTP status mapping so the (out of scope)
//! API surfaces can translate rejections without re-interpreting them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Standard error codes used throughout the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Booking & scheduling (1000-1999)
    #[serde(rename = "SERVICE_INACTIVE")]
    ServiceInactive = 1000,
    #[serde(rename = "OUTSIDE_HOURS")]
    OutsideHours = 1001,
    #[serde(rename = "SLOT_UNAVAILABLE")]
    SlotUnavailable = 1002,

    // Payments (2000-2999)
    #[serde(rename = "OVER_PAYMENT")]
    OverPayment = 2000,
    #[serde(rename = "REFUND_EXCEEDS_PAID")]
    RefundExceedsPaid = 2001,
    #[serde(rename = "BOOKING_NOT_PAYABLE")]
    BookingNotPayable = 2002,

    // Validation (3000-3999)
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,

    // Resource Management (4000-4999)
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound = 4000,

    // Payouts & external services (5000-5999)
    #[serde(rename = "PAYOUT_PROVIDER_ERROR")]
    PayoutProviderError = 5000,
    #[serde(rename = "PAYOUT_RECONCILIATION_REQUIRED")]
    PayoutReconciliationRequired = 5001,

    // Configuration (6000-6999)
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 6000,

    // Timeouts (7000-7999)
    #[serde(rename = "TIMEOUT")]
    Timeout = 7000,

    // Internal Errors (9000-9999)
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError = 9001,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidInput | Self::OutsideHours => 400,

            // 404 Not Found
            Self::ResourceNotFound => 404,

            // 409 Conflict - the request is valid but the current state forbids it
            Self::SlotUnavailable
            | Self::ServiceInactive
            | Self::OverPayment
            | Self::RefundExceedsPaid
            | Self::BookingNotPayable => 409,

            // 502 Bad Gateway
            Self::PayoutProviderError => 502,

            // 504 Gateway Timeout
            Self::Timeout => 504,

            // 500 Internal Server Error
            Self::PayoutReconciliationRequired
            | Self::ConfigError
            | Self::InternalError
            | Self::DatabaseError => 500,
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ServiceInactive => "The requested service is not currently offered",
            Self::OutsideHours => "The requested time falls outside opening hours",
            Self::SlotUnavailable => "The requested time slot is already taken",
            Self::OverPayment => "The capture would exceed the booking's total price",
            Self::RefundExceedsPaid => "The refund exceeds the amount paid so far",
            Self::BookingNotPayable => "The booking cannot accept payments in its current state",
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::PayoutProviderError => "The payout provider reported an error",
            Self::PayoutReconciliationRequired => {
                "Ledger entries require manual payout reconciliation"
            }
            Self::ConfigError => "Configuration error encountered",
            Self::Timeout => "The operation timed out",
            Self::InternalError => "An internal error occurred",
            Self::DatabaseError => "Database operation failed",
        }
    }

    /// Whether a failed operation with this code may succeed if retried later.
    ///
    /// Payout provider errors are retried on the next scheduled batch run;
    /// lost booking races are surfaced as `SlotUnavailable` and retrying is a
    /// caller policy, so they are not marked transient here.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::PayoutProviderError | Self::Timeout)
    }
}

/// Additional context that can be attached to errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// Booking ID if the error is attributable to one booking
    pub booking_id: Option<Uuid>,
    /// Owner ID for payout errors
    pub owner_id: Option<Uuid>,
    /// Additional key-value context
    pub details: serde_json::Value,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            request_id: None,
            booking_id: None,
            owner_id: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Unified error type for the engine
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add a request ID to the error context
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.context.request_id = Some(request_id.into());
        self
    }

    /// Add a booking ID to the error context
    #[must_use]
    pub fn with_booking_id(mut self, booking_id: Uuid) -> Self {
        self.context.booking_id = Some(booking_id);
        self
    }

    /// Add an owner ID to the error context
    #[must_use]
    pub fn with_owner_id(mut self, owner_id: Uuid) -> Self {
        self.context.owner_id = Some(owner_id);
        self
    }

    /// Add details to the error context
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = details;
        self
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Error response format handed to calling layers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error payload
    pub error: ErrorResponseDetails,
}

/// Serializable error payload
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Request ID if one was attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Booking ID if one was attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Uuid>,
    /// Additional details
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
                request_id: error.context.request_id,
                booking_id: error.context.booking_id,
                details: error.context.details,
            },
        }
    }
}

/// Convenience functions for creating common errors
impl AppError {
    /// The store service exists but its active flag is off
    pub fn service_inactive(service_id: Uuid) -> Self {
        Self::new(
            ErrorCode::ServiceInactive,
            format!("Store service {service_id} is inactive"),
        )
    }

    /// The requested interval is not contained in any open window
    pub fn outside_hours(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutsideHours, message)
    }

    /// The slot conflicts with an existing booking (or a lost race)
    pub fn slot_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SlotUnavailable, message)
    }

    /// Capture would push paid amount past the total price
    pub fn over_payment(paid_minor: i64, amount_minor: i64, total_minor: i64) -> Self {
        Self::new(
            ErrorCode::OverPayment,
            format!("Capture of {amount_minor} on top of {paid_minor} exceeds total {total_minor}"),
        )
        .with_details(serde_json::json!({
            "paid_minor": paid_minor,
            "amount_minor": amount_minor,
            "total_minor": total_minor,
        }))
    }

    /// Refund exceeds what has been paid
    pub fn refund_exceeds_paid(paid_minor: i64, amount_minor: i64) -> Self {
        Self::new(
            ErrorCode::RefundExceedsPaid,
            format!("Refund of {amount_minor} exceeds paid amount {paid_minor}"),
        )
    }

    /// Payments are not accepted in the booking's current state
    pub fn booking_not_payable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BookingNotPayable, message)
    }

    /// Transient payout provider failure; retried on the next scheduled run
    pub fn payout_provider(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayoutProviderError, message)
    }

    /// Ledger entries need operator attention before they can be paid out
    pub fn payout_reconciliation_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayoutReconciliationRequired, message)
    }

    /// Request-scoped timeout, distinct from business-rule failures
    pub fn timeout(operation: &str, timeout_secs: u64) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{operation}' timed out after {timeout_secs}s"),
        )
    }

    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

/// Conversion from `anyhow::Error`.
///
/// The storage layer reports failures through `anyhow`; anything crossing
/// into the service layer that way is a database-level fault.
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        match error.source() {
            Some(source) => Self::new(ErrorCode::DatabaseError, error.to_string()).with_details(
                serde_json::json!({
                    "source": source.to_string()
                }),
            ),
            None => Self::new(ErrorCode::DatabaseError, error.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(ErrorCode::DatabaseError, error.to_string())
    }
}
