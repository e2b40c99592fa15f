// ABOUTME: Ledger database operations for the append-only payment ledger
// ABOUTME: Entry appends plus the pending/inflight/paidout batch transitions of the payout flow

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use super::Database;
use crate::models::{EntryDirection, LedgerEntry, PayoutStatus};

const LEDGER_COLUMNS: &str = "id, booking_id, owner_id, direction, amount_minor, \
     payout_status, payout_batch_ref, payout_reference, payout_attempts, created_at";

/// One payout batch: the entries an owner's pending balance was aggregated from
///
/// `batch_ref` doubles as the idempotency key handed to the payout provider,
/// so a crashed batch can be re-submitted without double paying.
#[derive(Debug, Clone)]
pub struct OwnerBatch {
    /// Batch reference, the provider idempotency key
    pub batch_ref: Uuid,
    /// Owner being paid
    pub owner_id: Uuid,
    /// Entries selected into the batch
    pub entries: Vec<LedgerEntry>,
}

impl OwnerBatch {
    /// Net amount of the batch: captures minus refunds
    #[must_use]
    pub fn net_minor(&self) -> i64 {
        self.entries
            .iter()
            .map(|e| e.direction.signed_amount(e.amount_minor))
            .sum()
    }
}

impl Database {
    /// Create ledger tables
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_ledger(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                booking_id TEXT REFERENCES bookings(id),
                owner_id TEXT NOT NULL REFERENCES owners(id),
                direction TEXT NOT NULL CHECK (direction IN ('capture', 'refund', 'payout')),
                amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
                payout_status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (payout_status IN ('pending', 'inflight', 'paidout')),
                payout_batch_ref TEXT,
                payout_reference TEXT,
                payout_attempts INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_owner_status
             ON ledger_entries(owner_id, payout_status)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_booking ON ledger_entries(booking_id)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_ledger_batch ON ledger_entries(payout_batch_ref)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Append an entry to the ledger inside a transaction
    ///
    /// Entries are immutable after this point; only their payout lifecycle
    /// columns are touched, and only by the batch transition functions below.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn insert_ledger_entry_tx(
        conn: &mut SqliteConnection,
        entry: &LedgerEntry,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO ledger_entries
                (id, booking_id, owner_id, direction, amount_minor,
                 payout_status, payout_batch_ref, payout_reference, payout_attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(entry.id.to_string())
        .bind(entry.booking_id.map(|id| id.to_string()))
        .bind(entry.owner_id.to_string())
        .bind(entry.direction.as_str())
        .bind(entry.amount_minor)
        .bind(entry.payout_status.as_str())
        .bind(entry.payout_batch_ref.map(|id| id.to_string()))
        .bind(&entry.payout_reference)
        .bind(entry.payout_attempts)
        .bind(entry.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// All entries attributed to a booking, oldest first, inside a transaction
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn entries_for_booking_tx(
        conn: &mut SqliteConnection,
        booking_id: Uuid,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE booking_id = $1
            ORDER BY created_at, id
            "
        ))
        .bind(booking_id.to_string())
        .fetch_all(conn)
        .await?;

        rows.iter().map(row_to_ledger_entry).collect()
    }

    /// All entries attributed to a booking, oldest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn entries_for_booking(&self, booking_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE booking_id = $1
            ORDER BY created_at, id
            "
        ))
        .bind(booking_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_ledger_entry).collect()
    }

    /// Owners with pending entries still eligible for batching
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn owners_with_pending_entries(&self, max_attempts: u32) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT owner_id FROM ledger_entries
            WHERE payout_status = 'pending' AND payout_attempts < $1
            ORDER BY owner_id
            ",
        )
        .bind(max_attempts)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_owner_id).collect()
    }

    /// Owners with interrupted batches left in the inflight state
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn owners_with_inflight_entries(&self) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT owner_id FROM ledger_entries
            WHERE payout_status = 'inflight'
            ORDER BY owner_id
            ",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_owner_id).collect()
    }

    /// Owners holding entries whose payout attempts are exhausted
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn owners_with_exhausted_entries(&self, max_attempts: u32) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT owner_id FROM ledger_entries
            WHERE payout_status = 'pending' AND payout_attempts >= $1
            ORDER BY owner_id
            ",
        )
        .bind(max_attempts)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_owner_id).collect()
    }

    /// An owner's pending entries eligible for the next batch, inside a transaction
    ///
    /// Entries whose `payout_attempts` reached `max_attempts` are excluded;
    /// they wait for manual reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn selectable_pending_entries_tx(
        conn: &mut SqliteConnection,
        owner_id: Uuid,
        max_attempts: u32,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE owner_id = $1 AND payout_status = 'pending' AND payout_attempts < $2
            ORDER BY created_at, id
            "
        ))
        .bind(owner_id.to_string())
        .bind(max_attempts)
        .fetch_all(conn)
        .await?;

        rows.iter().map(row_to_ledger_entry).collect()
    }

    /// An owner's pending entries with exhausted payout attempts
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn exhausted_entries_for_owner(
        &self,
        owner_id: Uuid,
        max_attempts: u32,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE owner_id = $1 AND payout_status = 'pending' AND payout_attempts >= $2
            ORDER BY created_at, id
            "
        ))
        .bind(owner_id.to_string())
        .bind(max_attempts)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_ledger_entry).collect()
    }

    /// An owner's interrupted batches, grouped by batch reference
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or an inflight entry has no
    /// batch reference
    pub async fn inflight_batches_for_owner(&self, owner_id: Uuid) -> Result<Vec<OwnerBatch>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE owner_id = $1 AND payout_status = 'inflight'
            ORDER BY payout_batch_ref, created_at, id
            "
        ))
        .bind(owner_id.to_string())
        .fetch_all(self.pool())
        .await?;

        let mut batches: BTreeMap<Uuid, Vec<LedgerEntry>> = BTreeMap::new();
        for row in &rows {
            let entry = row_to_ledger_entry(row)?;
            let batch_ref = entry
                .payout_batch_ref
                .ok_or_else(|| anyhow!("Inflight ledger entry {} has no batch ref", entry.id))?;
            batches.entry(batch_ref).or_default().push(entry);
        }

        Ok(batches
            .into_iter()
            .map(|(batch_ref, entries)| OwnerBatch {
                batch_ref,
                owner_id,
                entries,
            })
            .collect())
    }

    /// Mark selected entries inflight under a fresh batch reference
    ///
    /// Only still-pending rows transition; the returned count must equal the
    /// number of selected entries or the caller is racing another batcher and
    /// must roll back.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn mark_batch_inflight_tx(
        conn: &mut SqliteConnection,
        entry_ids: &[Uuid],
        batch_ref: Uuid,
    ) -> Result<u64> {
        if entry_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = (0..entry_ids.len())
            .map(|i| format!("${}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE ledger_entries
             SET payout_status = 'inflight', payout_batch_ref = $1
             WHERE payout_status = 'pending' AND id IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(batch_ref.to_string());
        for id in entry_ids {
            query = query.bind(id.to_string());
        }

        let result = query.execute(conn).await?;
        Ok(result.rows_affected())
    }

    /// Finalize an inflight batch as paid out, recording the provider reference
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn finalize_batch_paidout_tx(
        conn: &mut SqliteConnection,
        batch_ref: Uuid,
        provider_reference: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE ledger_entries
            SET payout_status = 'paidout', payout_reference = $2
            WHERE payout_batch_ref = $1 AND payout_status = 'inflight'
            ",
        )
        .bind(batch_ref.to_string())
        .bind(provider_reference)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Roll an inflight batch back to pending after a clean provider failure
    ///
    /// Bumps `payout_attempts` and detaches the batch reference so the next
    /// run selects the entries afresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn rollback_batch_to_pending_tx(
        conn: &mut SqliteConnection,
        batch_ref: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE ledger_entries
            SET payout_status = 'pending', payout_batch_ref = NULL,
                payout_attempts = payout_attempts + 1
            WHERE payout_batch_ref = $1 AND payout_status = 'inflight'
            ",
        )
        .bind(batch_ref.to_string())
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Entries paid out under a batch reference
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn entries_for_batch(&self, batch_ref: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {LEDGER_COLUMNS} FROM ledger_entries
            WHERE payout_batch_ref = $1
            ORDER BY created_at, id
            "
        ))
        .bind(batch_ref.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_ledger_entry).collect()
    }
}

fn row_to_owner_id(row: &sqlx::sqlite::SqliteRow) -> Result<Uuid> {
    let owner_id: String = row.get("owner_id");
    Ok(Uuid::parse_str(&owner_id)?)
}

fn row_to_ledger_entry(row: &sqlx::sqlite::SqliteRow) -> Result<LedgerEntry> {
    let id: String = row.get("id");
    let booking_id: Option<String> = row.get("booking_id");
    let owner_id: String = row.get("owner_id");
    let direction: String = row.get("direction");
    let payout_status: String = row.get("payout_status");
    let payout_batch_ref: Option<String> = row.get("payout_batch_ref");

    Ok(LedgerEntry {
        id: Uuid::parse_str(&id)?,
        booking_id: booking_id.map(|s| Uuid::parse_str(&s)).transpose()?,
        owner_id: Uuid::parse_str(&owner_id)?,
        direction: direction.parse::<EntryDirection>()?,
        amount_minor: row.get("amount_minor"),
        payout_status: payout_status.parse::<PayoutStatus>()?,
        payout_batch_ref: payout_batch_ref.map(|s| Uuid::parse_str(&s)).transpose()?,
        payout_reference: row.get("payout_reference"),
        payout_attempts: row.get("payout_attempts"),
        created_at: row.get("created_at"),
    })
}
