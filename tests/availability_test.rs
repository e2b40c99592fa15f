// ABOUTME: Integration tests for the availability resolver over stored schedules
// ABOUTME: Covers coalescing, employee intersection, inactive rows, and closed days
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

mod common;

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use common::{create_test_database, monday, seed_salon, sunday, time};
use marcel_booking_core::availability::AvailabilityResolver;
use marcel_booking_core::models::{EmployeeAvailability, StoreAvailability, TimeWindow};

#[tokio::test]
async fn test_store_windows_for_open_day() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let resolver = AvailabilityResolver::new(database);

    let windows = resolver
        .resolve_windows(salon.store_id, None, monday())
        .await?;

    assert_eq!(windows, vec![TimeWindow::new(time(9, 0), time(17, 0))]);
    Ok(())
}

#[tokio::test]
async fn test_closed_day_is_empty_not_an_error() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let resolver = AvailabilityResolver::new(database);

    // The seeded store has no Sunday schedule at all
    let windows = resolver
        .resolve_windows(salon.store_id, None, sunday())
        .await?;
    assert!(windows.is_empty());

    // Same for a store nobody has ever scheduled
    let windows = resolver
        .resolve_windows(Uuid::new_v4(), None, monday())
        .await?;
    assert!(windows.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_overlapping_rows_are_coalesced() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;

    // A second Monday row 12:00-18:00 overlapping the seeded 09:00-17:00
    database
        .create_store_availability(&StoreAvailability {
            id: Uuid::new_v4(),
            store_id: salon.store_id,
            day_of_week: 1,
            opens_at: time(12, 0),
            closes_at: time(18, 0),
            is_active: true,
        })
        .await?;

    let resolver = AvailabilityResolver::new(database);
    let windows = resolver
        .resolve_windows(salon.store_id, None, monday())
        .await?;

    assert_eq!(windows, vec![TimeWindow::new(time(9, 0), time(18, 0))]);

    // No overlaps in the result, and ordered
    for pair in windows.windows(2) {
        assert!(pair[0].end <= pair[1].start);
    }
    Ok(())
}

#[tokio::test]
async fn test_inactive_rows_are_ignored() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;

    // An inactive evening extension must not widen the windows
    database
        .create_store_availability(&StoreAvailability {
            id: Uuid::new_v4(),
            store_id: salon.store_id,
            day_of_week: 1,
            opens_at: time(17, 0),
            closes_at: time(21, 0),
            is_active: false,
        })
        .await?;

    let resolver = AvailabilityResolver::new(database);
    let windows = resolver
        .resolve_windows(salon.store_id, None, monday())
        .await?;

    assert_eq!(windows, vec![TimeWindow::new(time(9, 0), time(17, 0))]);
    Ok(())
}

#[tokio::test]
async fn test_employee_windows_intersect_store_hours() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;

    // A part-timer working Monday 11:00-19:00; the store closes at 17:00
    let part_timer = Uuid::new_v4();
    database
        .create_employee(&marcel_booking_core::models::Employee {
            id: part_timer,
            display_name: "Meera".into(),
            created_at: Utc::now(),
        })
        .await?;
    database
        .create_employee_availability(&EmployeeAvailability {
            id: Uuid::new_v4(),
            employee_id: part_timer,
            store_id: salon.store_id,
            day_of_week: 1,
            starts_at: time(11, 0),
            ends_at: time(19, 0),
            is_active: true,
        })
        .await?;

    let resolver = AvailabilityResolver::new(database);
    let windows = resolver
        .resolve_windows(salon.store_id, Some(part_timer), monday())
        .await?;

    assert_eq!(windows, vec![TimeWindow::new(time(11, 0), time(17, 0))]);
    Ok(())
}

#[tokio::test]
async fn test_employee_with_no_shift_that_day_is_empty() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let resolver = AvailabilityResolver::new(database);

    // The seeded employee works Monday-Friday; Saturday the store is open
    // but they are not in
    let saturday = chrono::NaiveDate::from_ymd_opt(2025, 6, 7).unwrap();

    let store_windows = resolver
        .resolve_windows(salon.store_id, None, saturday)
        .await?;
    assert!(!store_windows.is_empty());

    let employee_windows = resolver
        .resolve_windows(salon.store_id, Some(salon.employee_id), saturday)
        .await?;
    assert!(employee_windows.is_empty());
    Ok(())
}
