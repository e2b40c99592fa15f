// ABOUTME: Integration tests for database creation, migrations, and persistence
// ABOUTME: File-backed SQLite round trip plus idempotent re-migration on reopen
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Marcel Bookings

mod common;

use anyhow::Result;
use tempfile::TempDir;

use marcel_booking_core::database::Database;

#[tokio::test]
async fn test_file_backed_database_is_created_and_persists() -> Result<()> {
    common::init_test_logging();
    let dir = TempDir::new()?;
    let path = dir.path().join("marcel.db");
    let url = format!("sqlite:{}", path.display());

    // First open creates the file and runs migrations
    let database = Database::new(&url).await?;
    assert!(path.exists());
    let salon = common::seed_salon(&database).await?;
    drop(database);

    // Reopening re-runs migrations (idempotent) and sees the seeded data
    let database = Database::new(&url).await?;
    let owner = database.get_owner(salon.owner_id).await?;
    assert!(owner.is_some());
    let service = database.get_store_service(salon.service_id).await?.unwrap();
    assert_eq!(service.price_minor, 1000);
    Ok(())
}

#[tokio::test]
async fn test_in_memory_database_shares_one_schema() -> Result<()> {
    // In-memory databases pin to a single pooled connection, so every
    // handle sees the same schema and data
    let database = common::create_test_database().await?;
    let salon = common::seed_salon(&database).await?;

    let employees = database.employees_for_store(salon.store_id).await?;
    assert_eq!(employees.len(), 1);
    assert_eq!(employees[0].display_name, "Ravi");
    Ok(())
}

#[tokio::test]
async fn test_departed_employees_drop_off_the_roster() -> Result<()> {
    let database = common::create_test_database().await?;
    let salon = common::seed_salon(&database).await?;

    database
        .end_assignment(salon.store_id, salon.employee_id, chrono::Utc::now())
        .await?;

    let employees = database.employees_for_store(salon.store_id).await?;
    assert!(employees.is_empty());
    Ok(())
}
