// ABOUTME: Catalog database operations for owners, stores, services, and employees
// ABOUTME: Handles registration plus the schedule rows the availability resolver reads

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::{
    Employee, EmployeeAvailability, Owner, Store, StoreAvailability, StoreEmployee, StoreService,
};

impl Database {
    /// Create catalog tables
    ///
    /// # Errors
    ///
    /// Returns an error if table or index creation fails
    pub(super) async fn migrate_catalog(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS owners (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                bank_account_ref TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS stores (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                location TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS store_availability (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                opens_at TIME NOT NULL,
                closes_at TIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS store_services (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                service_name TEXT NOT NULL,
                price_minor INTEGER NOT NULL CHECK (price_minor >= 0),
                duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS employees (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS store_employees (
                id TEXT PRIMARY KEY,
                store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                employee_id TEXT NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                joined_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                left_at DATETIME,
                UNIQUE (store_id, employee_id)
            )
            ",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS employee_availability (
                id TEXT PRIMARY KEY,
                employee_id TEXT NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
                store_id TEXT NOT NULL REFERENCES stores(id) ON DELETE CASCADE,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                starts_at TIME NOT NULL,
                ends_at TIME NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1
            )
            ",
        )
        .execute(self.pool())
        .await?;

        // Indexes for the resolver's hot lookups
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_store_availability_lookup
             ON store_availability(store_id, day_of_week, is_active)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_employee_availability_lookup
             ON employee_availability(employee_id, store_id, day_of_week, is_active)",
        )
        .execute(self.pool())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_store_services_store
             ON store_services(store_id, is_active)",
        )
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Register an owner
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_owner(&self, owner: &Owner) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO owners (id, display_name, bank_account_ref, created_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(owner.id.to_string())
        .bind(&owner.display_name)
        .bind(&owner.bank_account_ref)
        .bind(owner.created_at)
        .execute(self.pool())
        .await?;

        Ok(owner.id)
    }

    /// Get an owner by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_owner(&self, owner_id: Uuid) -> Result<Option<Owner>> {
        let row = sqlx::query(
            "SELECT id, display_name, bank_account_ref, created_at FROM owners WHERE id = $1",
        )
        .bind(owner_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_owner).transpose()
    }

    /// Get an owner by ID, returning an error if not found
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the owner is not found
    pub async fn get_owner_required(&self, owner_id: Uuid) -> Result<Owner> {
        self.get_owner(owner_id)
            .await?
            .ok_or_else(|| anyhow!("Owner not found: {owner_id}"))
    }

    /// Register a store
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_store(&self, store: &Store) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO stores (id, owner_id, name, location, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(store.id.to_string())
        .bind(store.owner_id.to_string())
        .bind(&store.name)
        .bind(&store.location)
        .bind(store.created_at)
        .execute(self.pool())
        .await?;

        Ok(store.id)
    }

    /// Get a store by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_store(&self, store_id: Uuid) -> Result<Option<Store>> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, location, created_at FROM stores WHERE id = $1",
        )
        .bind(store_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_store).transpose()
    }

    /// Add a weekly opening-hours window to a store
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_store_availability(&self, window: &StoreAvailability) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO store_availability (id, store_id, day_of_week, opens_at, closes_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(window.id.to_string())
        .bind(window.store_id.to_string())
        .bind(window.day_of_week)
        .bind(window.opens_at)
        .bind(window.closes_at)
        .bind(window.is_active)
        .execute(self.pool())
        .await?;

        Ok(window.id)
    }

    /// Active opening-hours windows of a store for one weekday, ordered by start
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn store_windows_for_day(
        &self,
        store_id: Uuid,
        day_of_week: u8,
    ) -> Result<Vec<StoreAvailability>> {
        let rows = sqlx::query(
            r"
            SELECT id, store_id, day_of_week, opens_at, closes_at, is_active
            FROM store_availability
            WHERE store_id = $1 AND day_of_week = $2 AND is_active = 1
            ORDER BY opens_at
            ",
        )
        .bind(store_id.to_string())
        .bind(day_of_week)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_store_availability).collect()
    }

    /// Add a priced service to a store
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_store_service(&self, service: &StoreService) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO store_services
                (id, store_id, service_name, price_minor, duration_minutes, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(service.id.to_string())
        .bind(service.store_id.to_string())
        .bind(&service.service_name)
        .bind(service.price_minor)
        .bind(service.duration_minutes)
        .bind(service.is_active)
        .bind(service.created_at)
        .execute(self.pool())
        .await?;

        Ok(service.id)
    }

    /// Get a service by ID
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn get_store_service(&self, service_id: Uuid) -> Result<Option<StoreService>> {
        let row = sqlx::query(
            r"
            SELECT id, store_id, service_name, price_minor, duration_minutes, is_active, created_at
            FROM store_services WHERE id = $1
            ",
        )
        .bind(service_id.to_string())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(row_to_store_service).transpose()
    }

    /// Activate or deactivate a service
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn set_service_active(&self, service_id: Uuid, is_active: bool) -> Result<()> {
        sqlx::query("UPDATE store_services SET is_active = $2 WHERE id = $1")
            .bind(service_id.to_string())
            .bind(is_active)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Register an employee
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_employee(&self, employee: &Employee) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO employees (id, display_name, created_at)
            VALUES ($1, $2, $3)
            ",
        )
        .bind(employee.id.to_string())
        .bind(&employee.display_name)
        .bind(employee.created_at)
        .execute(self.pool())
        .await?;

        Ok(employee.id)
    }

    /// Assign an employee to a store
    ///
    /// # Errors
    ///
    /// Returns an error if the employee is already assigned to the store or
    /// the insert fails
    pub async fn assign_employee(&self, assignment: &StoreEmployee) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO store_employees
                (id, store_id, employee_id, role, is_active, joined_at, left_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(assignment.id.to_string())
        .bind(assignment.store_id.to_string())
        .bind(assignment.employee_id.to_string())
        .bind(&assignment.role)
        .bind(assignment.is_active)
        .bind(assignment.joined_at)
        .bind(assignment.left_at)
        .execute(self.pool())
        .await?;

        Ok(assignment.id)
    }

    /// Active employees of a store
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn employees_for_store(&self, store_id: Uuid) -> Result<Vec<Employee>> {
        let rows = sqlx::query(
            r"
            SELECT e.id, e.display_name, e.created_at
            FROM employees e
            JOIN store_employees se ON se.employee_id = e.id
            WHERE se.store_id = $1 AND se.is_active = 1
            ORDER BY e.display_name
            ",
        )
        .bind(store_id.to_string())
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_employee).collect()
    }

    /// Mark an employee as having left a store
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails
    pub async fn end_assignment(
        &self,
        store_id: Uuid,
        employee_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE store_employees SET is_active = 0, left_at = $3
            WHERE store_id = $1 AND employee_id = $2
            ",
        )
        .bind(store_id.to_string())
        .bind(employee_id.to_string())
        .bind(left_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Add a weekly shift window for an employee at a store
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails
    pub async fn create_employee_availability(
        &self,
        window: &EmployeeAvailability,
    ) -> Result<Uuid> {
        sqlx::query(
            r"
            INSERT INTO employee_availability
                (id, employee_id, store_id, day_of_week, starts_at, ends_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(window.id.to_string())
        .bind(window.employee_id.to_string())
        .bind(window.store_id.to_string())
        .bind(window.day_of_week)
        .bind(window.starts_at)
        .bind(window.ends_at)
        .bind(window.is_active)
        .execute(self.pool())
        .await?;

        Ok(window.id)
    }

    /// Active shift windows of an employee at a store for one weekday
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub async fn employee_windows_for_day(
        &self,
        employee_id: Uuid,
        store_id: Uuid,
        day_of_week: u8,
    ) -> Result<Vec<EmployeeAvailability>> {
        let rows = sqlx::query(
            r"
            SELECT id, employee_id, store_id, day_of_week, starts_at, ends_at, is_active
            FROM employee_availability
            WHERE employee_id = $1 AND store_id = $2 AND day_of_week = $3 AND is_active = 1
            ORDER BY starts_at
            ",
        )
        .bind(employee_id.to_string())
        .bind(store_id.to_string())
        .bind(day_of_week)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(row_to_employee_availability).collect()
    }
}

fn row_to_owner(row: &sqlx::sqlite::SqliteRow) -> Result<Owner> {
    let id: String = row.get("id");

    Ok(Owner {
        id: Uuid::parse_str(&id)?,
        display_name: row.get("display_name"),
        bank_account_ref: row.get("bank_account_ref"),
        created_at: row.get("created_at"),
    })
}

fn row_to_store(row: &sqlx::sqlite::SqliteRow) -> Result<Store> {
    let id: String = row.get("id");
    let owner_id: String = row.get("owner_id");

    Ok(Store {
        id: Uuid::parse_str(&id)?,
        owner_id: Uuid::parse_str(&owner_id)?,
        name: row.get("name"),
        location: row.get("location"),
        created_at: row.get("created_at"),
    })
}

fn row_to_store_availability(row: &sqlx::sqlite::SqliteRow) -> Result<StoreAvailability> {
    let id: String = row.get("id");
    let store_id: String = row.get("store_id");

    Ok(StoreAvailability {
        id: Uuid::parse_str(&id)?,
        store_id: Uuid::parse_str(&store_id)?,
        day_of_week: row.get("day_of_week"),
        opens_at: row.get("opens_at"),
        closes_at: row.get("closes_at"),
        is_active: row.get("is_active"),
    })
}

fn row_to_store_service(row: &sqlx::sqlite::SqliteRow) -> Result<StoreService> {
    let id: String = row.get("id");
    let store_id: String = row.get("store_id");

    Ok(StoreService {
        id: Uuid::parse_str(&id)?,
        store_id: Uuid::parse_str(&store_id)?,
        service_name: row.get("service_name"),
        price_minor: row.get("price_minor"),
        duration_minutes: row.get("duration_minutes"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
    })
}

fn row_to_employee(row: &sqlx::sqlite::SqliteRow) -> Result<Employee> {
    let id: String = row.get("id");

    Ok(Employee {
        id: Uuid::parse_str(&id)?,
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    })
}

fn row_to_employee_availability(row: &sqlx::sqlite::SqliteRow) -> Result<EmployeeAvailability> {
    let id: String = row.get("id");
    let employee_id: String = row.get("employee_id");
    let store_id: String = row.get("store_id");

    Ok(EmployeeAvailability {
        id: Uuid::parse_str(&id)?,
        employee_id: Uuid::parse_str(&employee_id)?,
        store_id: Uuid::parse_str(&store_id)?,
        day_of_week: row.get("day_of_week"),
        starts_at: row.get("starts_at"),
        ends_at: row.get("ends_at"),
        is_active: row.get("is_active"),
    })
}
