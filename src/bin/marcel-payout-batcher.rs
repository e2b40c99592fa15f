// ABOUTME: Daemon running the daily payout batch over the settlement ledger
// ABOUTME: Loads config, opens the database, and drives the scheduler until shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

//! # Marcel Payout Batcher Binary
//!
//! Runs the payout batcher as a standalone daemon: once per day at the
//! configured UTC hour it sweeps the ledger and transfers each owner's
//! pending balance. `--run-now` executes a single batch immediately and
//! exits, which is the operational path for catch-up runs.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use tracing::{info, warn};
use uuid::Uuid;

use marcel_booking_core::config::EngineConfig;
use marcel_booking_core::database::Database;
use marcel_booking_core::errors::AppResult;
use marcel_booking_core::logging;
use marcel_booking_core::payouts::{PayoutBatcher, PayoutProvider, PayoutReceipt, PayoutRequest};

#[derive(Parser)]
#[command(name = "marcel-payout-batcher")]
#[command(about = "Marcel Bookings - daily payout batch over the settlement ledger")]
pub struct Args {
    /// Execute one batch immediately and exit instead of scheduling
    #[arg(long)]
    run_now: bool,

    /// Override the configured UTC hour for the daily batch
    #[arg(long)]
    payout_hour: Option<u8>,
}

/// Provider stand-in that logs transfers without moving money
///
/// The real provider integration is deployment-specific and wired in by the
/// operations layer; this binary defaults to dry-run so a misconfigured
/// deployment can never transfer funds by accident.
struct DryRunProvider;

#[async_trait]
impl PayoutProvider for DryRunProvider {
    async fn issue_payout(&self, request: PayoutRequest) -> AppResult<PayoutReceipt> {
        let reference = format!("dryrun-{}", Uuid::new_v4());
        warn!(
            destination = %request.destination_account_ref,
            amount_minor = request.amount_minor,
            currency = %request.currency,
            idempotency_key = %request.idempotency_key,
            reference = %reference,
            "DRY RUN: no money moved"
        );
        Ok(PayoutReceipt {
            provider_reference: reference,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Argument parsing failed: {e}");
            eprintln!("Using default configuration");
            Args {
                run_now: false,
                payout_hour: None,
            }
        }
    };

    let mut config = EngineConfig::from_env()?;
    if let Some(payout_hour) = args.payout_hour {
        config.payout_hour_utc = payout_hour;
        config.validate()?;
    }

    logging::init_from_env()?;

    info!("Starting Marcel payout batcher");
    info!("{}", config.summary());

    let database = Arc::new(Database::new(&config.database_url.to_connection_string()).await?);
    info!(
        "Database initialized: {}",
        config.database_url.to_connection_string()
    );

    warn!("No payout provider configured, running with the dry-run provider");
    let provider: Arc<dyn PayoutProvider> = Arc::new(DryRunProvider);
    let batcher = Arc::new(PayoutBatcher::new(database, provider, config));

    if args.run_now {
        match batcher.run_once(Utc::now()).await? {
            Some(report) => {
                info!(
                    owners = report.owners_seen,
                    batches = report.batches_submitted,
                    recovered = report.batches_recovered,
                    paid_minor = report.paid_minor,
                    failures = report.failures.len(),
                    reconciliation_required = report.reconciliation_required.len(),
                    "Payout run finished"
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            None => warn!("Another payout run is already in flight"),
        }
        return Ok(());
    }

    Arc::clone(&batcher).start_scheduler();
    info!("Payout scheduler running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping payout batcher");

    Ok(())
}
