// ABOUTME: Integration tests for the payout batcher's aggregation and crash safety
// ABOUTME: Covers idempotence, per-owner failure isolation, recovery, and attempt caps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

mod common;

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use common::{
    create_test_database, monday, seed_salon, slot_request, time, MockPayoutProvider, TestSalon,
};
use marcel_booking_core::booking::SlotAllocator;
use marcel_booking_core::database::Database;
use marcel_booking_core::errors::ErrorCode;
use marcel_booking_core::models::{EntryDirection, PayoutStatus};
use marcel_booking_core::payments::PaymentLedger;
use marcel_booking_core::payouts::PayoutBatcher;

/// Book one slot and capture the given amounts against it
async fn captured_booking(
    database: &Arc<Database>,
    salon: &TestSalon,
    start_hour: u32,
    amounts_minor: &[i64],
) -> Result<Uuid> {
    let allocator = SlotAllocator::new(Arc::clone(database), common::test_config());
    let ledger = PaymentLedger::new(Arc::clone(database), common::test_config());

    let booking = allocator
        .book_slot(slot_request(salon, None, monday(), time(start_hour, 0)))
        .await?;
    for &amount in amounts_minor {
        ledger.apply_capture(booking.id, amount).await?;
    }
    Ok(booking.id)
}

fn batcher(database: &Arc<Database>, provider: &Arc<MockPayoutProvider>) -> PayoutBatcher {
    PayoutBatcher::new(
        Arc::clone(database),
        Arc::clone(provider) as Arc<dyn marcel_booking_core::payouts::PayoutProvider>,
        common::test_config(),
    )
}

#[tokio::test]
async fn test_pending_entries_aggregate_into_one_transfer() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let booking_id = captured_booking(&database, &salon, 9, &[300, 700]).await?;

    let provider = MockPayoutProvider::new();
    let report = batcher(&database, &provider)
        .run_once(Utc::now())
        .await?
        .unwrap();

    assert_eq!(report.batches_submitted, 1);
    assert_eq!(report.paid_minor, 1000);
    assert!(report.failures.is_empty());

    // One provider call for the aggregate, not one per entry
    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount_minor, 1000);
    assert_eq!(calls[0].currency, "INR");

    // Both capture entries are paid out under the same provider reference
    let entries = database.entries_for_booking(booking_id).await?;
    assert_eq!(entries.len(), 2);
    let references: Vec<_> = entries
        .iter()
        .map(|e| {
            assert_eq!(e.payout_status, PayoutStatus::PaidOut);
            e.payout_reference.clone().unwrap()
        })
        .collect();
    assert_eq!(references[0], references[1]);
    Ok(())
}

#[tokio::test]
async fn test_back_to_back_runs_pay_at_most_once() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    captured_booking(&database, &salon, 9, &[1000]).await?;

    let provider = MockPayoutProvider::new();
    let batcher = batcher(&database, &provider);

    batcher.run_once(Utc::now()).await?.unwrap();
    let second = batcher.run_once(Utc::now()).await?.unwrap();

    assert_eq!(second.batches_submitted, 0);
    assert_eq!(second.paid_minor, 0);
    assert_eq!(provider.calls().len(), 1);
    assert_eq!(provider.transfers_executed(), 1);
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_rolls_back_and_spares_other_owners() -> Result<()> {
    let database = create_test_database().await?;
    let salon_a = seed_salon(&database).await?;
    let salon_b = seed_salon(&database).await?;
    let booking_a = captured_booking(&database, &salon_a, 9, &[500]).await?;
    captured_booking(&database, &salon_b, 9, &[800]).await?;

    // First run fails for everyone
    let provider = MockPayoutProvider::new();
    provider.set_failing(true);
    let batcher = batcher(&database, &provider);
    let report = batcher.run_once(Utc::now()).await?.unwrap();

    assert_eq!(report.owners_seen, 2);
    assert_eq!(report.batches_submitted, 0);
    assert_eq!(report.failures.len(), 2);

    // Failed entries return to pending with a bumped attempt count
    let entries = database.entries_for_booking(booking_a).await?;
    assert_eq!(entries[0].payout_status, PayoutStatus::Pending);
    assert_eq!(entries[0].payout_attempts, 1);
    assert!(entries[0].payout_batch_ref.is_none());

    // The provider recovers; the next scheduled run pays both owners
    provider.set_failing(false);
    let report = batcher.run_once(Utc::now()).await?.unwrap();
    assert_eq!(report.batches_submitted, 2);
    assert_eq!(report.paid_minor, 1300);
    assert!(report.failures.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exhausted_entries_need_reconciliation_not_retries() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    captured_booking(&database, &salon, 9, &[500]).await?;

    let provider = MockPayoutProvider::new();
    provider.set_failing(true);
    let batcher = batcher(&database, &provider);

    // Default cap is 3 attempts
    for _ in 0..3 {
        batcher.run_once(Utc::now()).await?.unwrap();
    }

    // The entry is out of attempts: no more provider calls, the owner is
    // flagged for an operator instead
    provider.set_failing(false);
    let report = batcher.run_once(Utc::now()).await?.unwrap();
    assert_eq!(report.batches_submitted, 0);
    assert_eq!(report.reconciliation_required.len(), 1);
    assert_eq!(report.reconciliation_required[0].owner_id, salon.owner_id);
    assert_eq!(provider.calls().len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_batch_is_recovered_with_its_original_key() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let booking_id = captured_booking(&database, &salon, 9, &[1000]).await?;

    // Simulate a crash after the inflight mark committed but before the
    // provider answered: entries sit inflight under a batch reference
    let entries = database.entries_for_booking(booking_id).await?;
    let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
    let orphaned_batch_ref = Uuid::new_v4();
    let mut tx = database.pool().begin().await?;
    Database::mark_batch_inflight_tx(&mut tx, &ids, orphaned_batch_ref).await?;
    tx.commit().await?;

    let provider = MockPayoutProvider::new();
    let report = batcher(&database, &provider)
        .run_once(Utc::now())
        .await?
        .unwrap();

    // Recovered, not re-summed into a fresh batch
    assert_eq!(report.batches_recovered, 1);
    assert_eq!(report.batches_submitted, 0);
    assert_eq!(report.paid_minor, 1000);

    // The provider saw the original batch reference as the idempotency key
    let calls = provider.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].idempotency_key, orphaned_batch_ref);

    let entries = database.entries_for_booking(booking_id).await?;
    assert_eq!(entries[0].payout_status, PayoutStatus::PaidOut);
    Ok(())
}

#[tokio::test]
async fn test_fully_refunded_balance_is_not_paid_out() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let booking_id = captured_booking(&database, &salon, 9, &[500]).await?;

    let ledger = PaymentLedger::new(Arc::clone(&database), common::test_config());
    ledger.apply_refund(booking_id, 500).await?;

    // Net balance is zero; the owner has nothing payable
    let provider = MockPayoutProvider::new();
    let report = batcher(&database, &provider)
        .run_once(Utc::now())
        .await?
        .unwrap();

    assert_eq!(report.batches_submitted, 0);
    assert!(provider.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_refund_after_payout_is_a_reconciliation_case() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    let booking_id = captured_booking(&database, &salon, 9, &[1000]).await?;

    let provider = MockPayoutProvider::new();
    batcher(&database, &provider).run_once(Utc::now()).await?;

    // The money already left for the owner's bank account; a refund can no
    // longer be netted against it
    let ledger = PaymentLedger::new(Arc::clone(&database), common::test_config());
    let error = ledger.apply_refund(booking_id, 500).await.unwrap_err();
    assert_eq!(error.code, ErrorCode::PayoutReconciliationRequired);
    Ok(())
}

#[tokio::test]
async fn test_payout_record_documents_the_transfer() -> Result<()> {
    let database = create_test_database().await?;
    let salon = seed_salon(&database).await?;
    captured_booking(&database, &salon, 9, &[300, 700]).await?;

    let provider = MockPayoutProvider::new();
    batcher(&database, &provider).run_once(Utc::now()).await?;

    // The aggregate transfer is itself on the ledger: a payout-direction
    // entry attributed to the owner, with no booking
    let owners = database.owners_with_pending_entries(3).await?;
    assert!(owners.is_empty());

    let calls = provider.calls();
    let batch_entries = database.entries_for_batch(calls[0].idempotency_key).await?;
    let payout_record = batch_entries
        .iter()
        .find(|e| e.direction == EntryDirection::Payout)
        .expect("payout record appended");
    assert_eq!(payout_record.amount_minor, 1000);
    assert!(payout_record.booking_id.is_none());
    assert_eq!(payout_record.owner_id, salon.owner_id);
    assert_eq!(payout_record.payout_status, PayoutStatus::PaidOut);
    Ok(())
}
