// ABOUTME: Concurrency tests for the slot allocator's single-winner guarantee
// ABOUTME: Racing requests for one slot produce exactly one booking, never two
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

mod common;

use anyhow::Result;
use std::sync::Arc;

use common::{create_test_database, monday, seed_salon, slot_request, time};
use marcel_booking_core::booking::SlotAllocator;
use marcel_booking_core::errors::ErrorCode;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_of_racing_requests_wins() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let allocator = Arc::new(SlotAllocator::new(
        Arc::clone(&database),
        common::test_config(),
    ));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let allocator = Arc::clone(&allocator);
        let request = slot_request(&salon, Some(salon.employee_id), monday(), time(9, 0));
        handles.push(tokio::spawn(
            async move { allocator.book_slot(request).await },
        ));
    }

    let mut winners = 0;
    let mut losers = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => winners += 1,
            Err(e) => {
                assert_eq!(e.code, ErrorCode::SlotUnavailable);
                losers += 1;
            }
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(losers, 9);

    // The store ends the day with a single booking, no corrupted overlap
    let bookings = database.bookings_for_day(salon.store_id, monday()).await?;
    assert_eq!(bookings.len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_requests_for_disjoint_slots_all_win() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let allocator = Arc::new(SlotAllocator::new(
        Arc::clone(&database),
        common::test_config(),
    ));

    // 09:00, 10:00, ..., 16:00 in parallel; every slot is distinct
    let mut handles = Vec::new();
    for hour in 9..17 {
        let allocator = Arc::clone(&allocator);
        let request = slot_request(&salon, Some(salon.employee_id), monday(), time(hour, 0));
        handles.push(tokio::spawn(
            async move { allocator.book_slot(request).await },
        ));
    }

    for handle in handles {
        handle.await??;
    }

    let bookings = database.bookings_for_day(salon.store_id, monday()).await?;
    assert_eq!(bookings.len(), 8);
    for pair in bookings.windows(2) {
        assert!(!pair[0].window().overlaps(&pair[1].window()));
    }
    Ok(())
}
