// ABOUTME: Payout batching: aggregates owners' settled ledger balances into provider transfers
// ABOUTME: Inflight state is durable before the external call; batch refs double as idempotency keys

// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Payout Batcher
//!
//! Periodically sweeps the ledger and pays each owner their pending balance
//! (captures minus refunds) through an external [`PayoutProvider`].
//!
//! ## Crash safety
//!
//! Selected entries are marked `inflight` under a fresh batch reference and
//! that transaction commits *before* the provider is called. The batch
//! reference is the provider idempotency key: if the process dies around the
//! external call, the next run finds the inflight batch and re-submits it
//! with the same key, so the provider deduplicates and no owner is paid
//! twice. Recovered batches are never re-summed into new ones.
//!
//! ## Failure isolation
//!
//! Owners are processed independently: one owner's provider failure rolls
//! only their batch back to `pending` (bumping each entry's attempt count)
//! and the run continues. Entries whose attempts reach the configured cap
//! are excluded from future batches and surfaced for manual reconciliation.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::constants::limits;
use crate::database::transactions::{retry_transaction, TransactionGuard};
use crate::database::{Database, OwnerBatch};
use crate::errors::{AppError, AppResult};
use crate::logging::AppLogger;
use crate::models::{EntryDirection, LedgerEntry, PayoutStatus};

/// A transfer order handed to the payout provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutRequest {
    /// Opaque bank account reference of the owner
    pub destination_account_ref: String,
    /// Amount in integer minor units
    pub amount_minor: i64,
    /// ISO 4217 currency code
    pub currency: String,
    /// Idempotency key; the provider must treat repeats as the same transfer
    pub idempotency_key: Uuid,
}

/// Provider acknowledgement of an executed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// Provider-side reference for the transfer
    pub provider_reference: String,
}

/// External money-movement capability
///
/// Implementations must deduplicate on `idempotency_key`: issuing the same
/// request twice executes at most one transfer and returns the same
/// reference. Returning `Err` asserts the transfer definitively did not and
/// will not execute; ambiguous outcomes (network timeouts, unknown states)
/// must be resolved against the provider before answering, because the
/// batcher rolls failed batches back into the payable pool.
#[async_trait]
pub trait PayoutProvider: Send + Sync {
    /// Execute a transfer to an owner's bank account
    ///
    /// # Errors
    ///
    /// Returns an error when the transfer was definitively not executed.
    async fn issue_payout(&self, request: PayoutRequest) -> AppResult<PayoutReceipt>;
}

/// What happened to one owner during a run
#[derive(Debug, Clone, Serialize)]
pub struct OwnerRunError {
    /// Owner concerned
    pub owner_id: Uuid,
    /// Human-readable detail
    pub detail: String,
}

/// Summary of one payout run
#[derive(Debug, Clone, Serialize)]
pub struct PayoutRunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Owners that had ledger state worth looking at
    pub owners_seen: u32,
    /// Fresh batches paid out this run
    pub batches_submitted: u32,
    /// Interrupted batches recovered from a previous run
    pub batches_recovered: u32,
    /// Total amount transferred, in minor units
    pub paid_minor: i64,
    /// Owners whose batch failed this run (rolled back to pending)
    pub failures: Vec<OwnerRunError>,
    /// Owners with entries stuck past the attempt cap, needing an operator
    pub reconciliation_required: Vec<OwnerRunError>,
}

impl PayoutRunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            owners_seen: 0,
            batches_submitted: 0,
            batches_recovered: 0,
            paid_minor: 0,
            failures: Vec::new(),
            reconciliation_required: Vec::new(),
        }
    }
}

/// Aggregates pending ledger balances into per-owner provider transfers
pub struct PayoutBatcher {
    database: Arc<Database>,
    provider: Arc<dyn PayoutProvider>,
    config: EngineConfig,
    run_lock: tokio::sync::Mutex<()>,
}

impl PayoutBatcher {
    /// Create a new batcher over the given database and provider
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        provider: Arc<dyn PayoutProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            database,
            provider,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Start the daily payout scheduler
    ///
    /// Ticks hourly and runs the batch when the clock reaches the configured
    /// UTC hour. Runs never overlap: a tick that finds one in flight skips.
    pub fn start_scheduler(self: Arc<Self>) {
        info!(
            "Starting payout scheduler - hourly tick, batching at {:02}:00 UTC",
            self.config.payout_hour_utc
        );

        let batcher = Arc::clone(&self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(limits::PAYOUT_TICK_SECS));

            loop {
                interval.tick().await;

                let now = Utc::now();
                if u8::try_from(now.hour()).unwrap_or(0) == batcher.config.payout_hour_utc {
                    match batcher.run_once(now).await {
                        Ok(Some(report)) => info!(
                            owners = report.owners_seen,
                            batches = report.batches_submitted,
                            recovered = report.batches_recovered,
                            paid_minor = report.paid_minor,
                            failures = report.failures.len(),
                            "Payout run finished"
                        ),
                        Ok(None) => warn!("Previous payout run still in flight, skipping tick"),
                        Err(e) => error!("Payout run failed: {}", e),
                    }
                }
            }
        });
    }

    /// Execute one payout run over the whole ledger
    ///
    /// `now` is passed in rather than read from a clock so runs are
    /// reproducible in tests. Returns `None` when another run already holds
    /// the single-flight lock.
    ///
    /// # Errors
    ///
    /// Returns an error only when the ledger scan itself fails; per-owner
    /// failures are isolated and reported in the
    /// [`PayoutRunReport::failures`] list instead.
    pub async fn run_once(&self, now: DateTime<Utc>) -> AppResult<Option<PayoutRunReport>> {
        let Ok(_run_guard) = self.run_lock.try_lock() else {
            return Ok(None);
        };

        let mut report = PayoutRunReport::new(now);
        let max_attempts = self.config.payout_max_attempts;

        // Owners with interrupted batches come first so recovery happens even
        // when they have nothing new to pay
        let mut owners: BTreeSet<Uuid> = BTreeSet::new();
        owners.extend(self.database.owners_with_inflight_entries().await?);
        owners.extend(
            self.database
                .owners_with_pending_entries(max_attempts)
                .await?,
        );
        owners.extend(
            self.database
                .owners_with_exhausted_entries(max_attempts)
                .await?,
        );
        report.owners_seen = u32::try_from(owners.len()).unwrap_or(u32::MAX);

        for owner_id in owners {
            if let Err(e) = self.process_owner(owner_id, now, &mut report).await {
                error!(owner_id = %owner_id, error = %e, "Owner payout processing failed");
                report.failures.push(OwnerRunError {
                    owner_id,
                    detail: e.to_string(),
                });
            }
        }

        Ok(Some(report))
    }

    async fn process_owner(
        &self,
        owner_id: Uuid,
        now: DateTime<Utc>,
        report: &mut PayoutRunReport,
    ) -> AppResult<()> {
        let owner = self.database.get_owner_required(owner_id).await?;

        // Step 1: recover interrupted batches with their original keys
        for batch in self.database.inflight_batches_for_owner(owner_id).await? {
            self.settle_batch(&batch, &owner.bank_account_ref, now, true, report)
                .await?;
        }

        // Step 2: aggregate and mark a fresh batch; the inflight state is
        // committed before the provider call
        if let Some(batch) = self.select_fresh_batch(owner_id).await? {
            self.settle_batch(&batch, &owner.bank_account_ref, now, false, report)
                .await?;
        }

        // Step 3: surface entries stuck past the attempt cap
        let exhausted = self
            .database
            .exhausted_entries_for_owner(owner_id, self.config.payout_max_attempts)
            .await?;
        if !exhausted.is_empty() {
            let stuck_minor: i64 = exhausted
                .iter()
                .map(|e| e.direction.signed_amount(e.amount_minor))
                .sum();
            error!(
                owner_id = %owner_id,
                entries = exhausted.len(),
                stuck_minor = stuck_minor,
                "Ledger entries exhausted their payout attempts, manual reconciliation required"
            );
            report.reconciliation_required.push(OwnerRunError {
                owner_id,
                detail: format!(
                    "{} entries totalling {} minor units exceeded {} payout attempts",
                    exhausted.len(),
                    stuck_minor,
                    self.config.payout_max_attempts
                ),
            });
        }

        Ok(())
    }

    /// Select an owner's payable entries and durably mark them inflight
    ///
    /// Returns `None` when the owner has nothing payable (no entries, or a
    /// net balance of zero or less, which stays pending until future
    /// captures lift it).
    async fn select_fresh_batch(&self, owner_id: Uuid) -> AppResult<Option<OwnerBatch>> {
        let max_attempts = self.config.payout_max_attempts;
        let batch_ref = Uuid::new_v4();

        retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);

                let entries = Database::selectable_pending_entries_tx(
                    guard.executor()?,
                    owner_id,
                    max_attempts,
                )
                .await?;

                let net_minor: i64 = entries
                    .iter()
                    .map(|e| e.direction.signed_amount(e.amount_minor))
                    .sum();
                if entries.is_empty() || net_minor <= 0 {
                    return Ok(None);
                }

                let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
                let marked =
                    Database::mark_batch_inflight_tx(guard.executor()?, &ids, batch_ref).await?;
                if marked != ids.len() as u64 {
                    // Another writer touched the selection under us; the
                    // guard rolls everything back
                    return Err(AppError::database(format!(
                        "Batch selection raced: marked {marked} of {} entries",
                        ids.len()
                    )));
                }

                guard.commit().await?;
                Ok(Some(OwnerBatch {
                    batch_ref,
                    owner_id,
                    entries,
                }))
            },
            limits::MAX_TXN_RETRIES,
        )
        .await
    }

    /// Submit one batch to the provider and finalize or roll back
    async fn settle_batch(
        &self,
        batch: &OwnerBatch,
        bank_account_ref: &str,
        now: DateTime<Utc>,
        recovered: bool,
        report: &mut PayoutRunReport,
    ) -> AppResult<()> {
        let net_minor = batch.net_minor();

        if net_minor <= 0 {
            // An inflight batch should always carry a positive net; release
            // the entries and let an operator look at the history
            warn!(
                batch_ref = %batch.batch_ref,
                owner_id = %batch.owner_id,
                net_minor = net_minor,
                "Inflight batch with non-positive net, releasing to pending"
            );
            self.rollback_batch(batch.batch_ref).await?;
            report.reconciliation_required.push(OwnerRunError {
                owner_id: batch.owner_id,
                detail: format!(
                    "Batch {} had non-positive net {} and was released",
                    batch.batch_ref, net_minor
                ),
            });
            return Ok(());
        }

        let request = PayoutRequest {
            destination_account_ref: bank_account_ref.to_string(),
            amount_minor: net_minor,
            currency: self.config.payout_currency.clone(),
            idempotency_key: batch.batch_ref,
        };

        let started = Instant::now();
        match self.provider.issue_payout(request).await {
            Ok(receipt) => {
                self.finalize_batch(batch, net_minor, &receipt.provider_reference, now)
                    .await?;
                if recovered {
                    report.batches_recovered += 1;
                } else {
                    report.batches_submitted += 1;
                }
                report.paid_minor += net_minor;
                AppLogger::log_payout_batch(
                    &batch.batch_ref.to_string(),
                    &batch.owner_id.to_string(),
                    net_minor,
                    true,
                    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    batch_ref = %batch.batch_ref,
                    owner_id = %batch.owner_id,
                    amount_minor = net_minor,
                    error = %e,
                    "Provider rejected payout, rolling batch back to pending"
                );
                self.rollback_batch(batch.batch_ref).await?;
                report.failures.push(OwnerRunError {
                    owner_id: batch.owner_id,
                    detail: format!("Batch {}: {e}", batch.batch_ref),
                });
                AppLogger::log_payout_batch(
                    &batch.batch_ref.to_string(),
                    &batch.owner_id.to_string(),
                    net_minor,
                    false,
                    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
                );
                Ok(())
            }
        }
    }

    /// Mark a batch paid out and append the aggregate payout record
    async fn finalize_batch(
        &self,
        batch: &OwnerBatch,
        net_minor: i64,
        provider_reference: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);

                Database::finalize_batch_paidout_tx(
                    guard.executor()?,
                    batch.batch_ref,
                    provider_reference,
                )
                .await?;

                let record = LedgerEntry {
                    id: Uuid::new_v4(),
                    booking_id: None,
                    owner_id: batch.owner_id,
                    direction: EntryDirection::Payout,
                    amount_minor: net_minor,
                    payout_status: PayoutStatus::PaidOut,
                    payout_batch_ref: Some(batch.batch_ref),
                    payout_reference: Some(provider_reference.to_string()),
                    payout_attempts: 0,
                    created_at: now,
                };
                Database::insert_ledger_entry_tx(guard.executor()?, &record).await?;

                guard.commit().await
            },
            limits::MAX_TXN_RETRIES,
        )
        .await
    }

    /// Release a batch back to pending, bumping each entry's attempt count
    async fn rollback_batch(&self, batch_ref: Uuid) -> AppResult<()> {
        retry_transaction(
            || async {
                let tx = self.database.pool().begin().await?;
                let mut guard = TransactionGuard::new(tx);
                Database::rollback_batch_to_pending_tx(guard.executor()?, batch_ref).await?;
                guard.commit().await
            },
            limits::MAX_TXN_RETRIES,
        )
        .await
    }
}
