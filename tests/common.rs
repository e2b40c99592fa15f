// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides database fixtures, a seeded salon graph, and a mock payout provider
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]
//! Shared test utilities for `marcel_booking_core`
//!
//! Common setup to reduce duplication across integration tests: an in-memory
//! database, a seeded owner -> store -> service -> schedule graph, and a mock
//! payout provider with controllable failures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use marcel_booking_core::config::{DatabaseUrl, EngineConfig};
use marcel_booking_core::database::Database;
use marcel_booking_core::errors::{AppError, AppResult};
use marcel_booking_core::models::{
    Employee, EmployeeAvailability, Owner, SlotRequest, Store, StoreAvailability, StoreEmployee,
    StoreService,
};
use marcel_booking_core::payouts::{PayoutProvider, PayoutReceipt, PayoutRequest};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Arc<Database>> {
    init_test_logging();
    let database = Arc::new(Database::new("sqlite::memory:").await?);
    Ok(database)
}

/// Engine configuration for tests: in-memory database, default knobs
/// (50% partial threshold, 3 payout attempts, INR)
pub fn test_config() -> EngineConfig {
    EngineConfig {
        database_url: DatabaseUrl::Memory,
        ..EngineConfig::default()
    }
}

/// Shorthand for a whole-minute time of day
pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// A fixed Monday used across date-dependent tests
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

/// The Sunday before [`monday`]; the seeded store is closed that day
pub fn sunday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

/// Seeded owner -> store -> service -> schedule graph
#[derive(Debug, Clone)]
pub struct TestSalon {
    pub owner_id: Uuid,
    pub store_id: Uuid,
    pub service_id: Uuid,
    pub employee_id: Uuid,
}

/// Seed a salon with a 1000-minor-unit, 60-minute service
///
/// Store hours: Monday through Saturday 09:00-17:00. The employee works
/// Monday through Friday 09:00-17:00.
pub async fn seed_salon(database: &Database) -> Result<TestSalon> {
    seed_salon_with(database, 1000, 60).await
}

/// Seed a salon with a custom service price and duration
pub async fn seed_salon_with(
    database: &Database,
    price_minor: i64,
    duration_minutes: u32,
) -> Result<TestSalon> {
    let now = Utc::now();

    let owner = Owner {
        id: Uuid::new_v4(),
        display_name: "Asha Salon Group".into(),
        bank_account_ref: format!("acct_test_{}", Uuid::new_v4().simple()),
        created_at: now,
    };
    database.create_owner(&owner).await?;

    let store = Store {
        id: Uuid::new_v4(),
        owner_id: owner.id,
        name: "Marcel Koramangala".into(),
        location: "Bengaluru".into(),
        created_at: now,
    };
    database.create_store(&store).await?;

    // Monday = 1 through Saturday = 6
    for day_of_week in 1..=6 {
        database
            .create_store_availability(&StoreAvailability {
                id: Uuid::new_v4(),
                store_id: store.id,
                day_of_week,
                opens_at: time(9, 0),
                closes_at: time(17, 0),
                is_active: true,
            })
            .await?;
    }

    let service = StoreService {
        id: Uuid::new_v4(),
        store_id: store.id,
        service_name: "haircut".into(),
        price_minor,
        duration_minutes,
        is_active: true,
        created_at: now,
    };
    database.create_store_service(&service).await?;

    let employee = seed_employee(database, store.id, "Ravi").await?;

    Ok(TestSalon {
        owner_id: owner.id,
        store_id: store.id,
        service_id: service.id,
        employee_id: employee,
    })
}

/// Register an employee at a store, working Monday through Friday 09:00-17:00
pub async fn seed_employee(database: &Database, store_id: Uuid, name: &str) -> Result<Uuid> {
    let now = Utc::now();

    let employee = Employee {
        id: Uuid::new_v4(),
        display_name: name.into(),
        created_at: now,
    };
    database.create_employee(&employee).await?;

    database
        .assign_employee(&StoreEmployee {
            id: Uuid::new_v4(),
            store_id,
            employee_id: employee.id,
            role: "stylist".into(),
            is_active: true,
            joined_at: now,
            left_at: None,
        })
        .await?;

    for day_of_week in 1..=5 {
        database
            .create_employee_availability(&EmployeeAvailability {
                id: Uuid::new_v4(),
                employee_id: employee.id,
                store_id,
                day_of_week,
                starts_at: time(9, 0),
                ends_at: time(17, 0),
                is_active: true,
            })
            .await?;
    }

    Ok(employee.id)
}

/// Build a slot request against the seeded salon
pub fn slot_request(
    salon: &TestSalon,
    employee_id: Option<Uuid>,
    date: NaiveDate,
    start_time: NaiveTime,
) -> SlotRequest {
    SlotRequest {
        customer_id: Uuid::new_v4(),
        store_id: salon.store_id,
        store_service_id: salon.service_id,
        employee_id,
        date,
        start_time,
        notes: None,
    }
}

/// Mock payout provider recording every call
///
/// Deduplicates on the idempotency key the way a real provider must: a
/// repeated key returns the original reference without a second transfer.
/// Flip [`Self::set_failing`] to simulate a provider outage.
pub struct MockPayoutProvider {
    calls: Mutex<Vec<PayoutRequest>>,
    references: Mutex<HashMap<Uuid, String>>,
    failing: AtomicBool,
}

impl MockPayoutProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            references: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        })
    }

    /// Make subsequent calls fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every call the provider has seen, in order
    pub fn calls(&self) -> Vec<PayoutRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls that executed a transfer (first call per key)
    pub fn transfers_executed(&self) -> usize {
        self.references.lock().unwrap().len()
    }
}

impl Default for MockPayoutProvider {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            references: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl PayoutProvider for MockPayoutProvider {
    async fn issue_payout(&self, request: PayoutRequest) -> AppResult<PayoutReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::payout_provider("simulated provider outage"));
        }

        let idempotency_key = request.idempotency_key;
        self.calls.lock().unwrap().push(request);

        let mut references = self.references.lock().unwrap();
        let reference = references
            .entry(idempotency_key)
            .or_insert_with(|| format!("mockpay_{}", Uuid::new_v4().simple()))
            .clone();

        Ok(PayoutReceipt {
            provider_reference: reference,
        })
    }
}
