//! Database schema migration management.
//!
//! Maintains a versioned record of applied migrations and brings the schema
//! up to date during initialization. Each migration runs inside the shared
//! transaction that `run_migrations` opens, so a failure leaves the database
//! at its previous version.

use anyhow::Result;
use rusqlite::{params, Connection, Transaction};
use tracing::{debug, info};

/// SQL schema for the migrations tracking table.
const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS migrations (
    id INTEGER PRIMARY KEY,
    version INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
)";

/// A single schema change with version tracking.
#[derive(Debug, Clone)]
struct Migration {
    version: u32,
    name: &'static str,
    up: fn(&Transaction) -> Result<()>,
}

/// Registry of all migrations in version order.
pub struct MigrationManager {
    migrations: Vec<Migration>,
}

impl MigrationManager {
    pub fn new() -> Self {
        let mut manager = Self { migrations: Vec::new() };
        manager.register_migrations();
        manager
    }

    fn register_migrations(&mut self) {
        // Version 1: core tables for attendance tracking
        self.add_migration(1, "create_core_tables", |tx| {
            tx.execute(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT NOT NULL PRIMARY KEY,
                    username TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1
                )",
                [],
            )?;

            tx.execute(
                "CREATE TABLE IF NOT EXISTS attendance_records (
                    id TEXT NOT NULL PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    date DATE NOT NULL,
                    check_in_time TEXT,
                    check_out_time TEXT,
                    current_state TEXT,
                    last_state_change_at TEXT,
                    active_seconds INTEGER NOT NULL DEFAULT 0,
                    idle_seconds INTEGER NOT NULL DEFAULT 0,
                    lunch_seconds INTEGER NOT NULL DEFAULT 0,
                    total_work_duration INTEGER,
                    total_active_duration INTEGER,
                    total_idle_duration INTEGER,
                    total_break_duration INTEGER
                )",
                [],
            )?;

            tx.execute(
                "CREATE TABLE IF NOT EXISTS lunch_breaks (
                    id TEXT NOT NULL PRIMARY KEY,
                    attendance_record_id TEXT NOT NULL,
                    break_start_time TEXT NOT NULL,
                    break_end_time TEXT,
                    duration INTEGER,
                    start_location TEXT,
                    end_location TEXT,
                    FOREIGN KEY (attendance_record_id) REFERENCES attendance_records(id) ON DELETE CASCADE
                )",
                [],
            )?;

            tx.execute(
                "CREATE TABLE IF NOT EXISTS activity_log (
                    id INTEGER NOT NULL PRIMARY KEY,
                    attendance_record_id TEXT NOT NULL,
                    segment_type TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    ended_at TEXT,
                    FOREIGN KEY (attendance_record_id) REFERENCES attendance_records(id) ON DELETE CASCADE
                )",
                [],
            )?;

            tx.execute(
                "CREATE TABLE IF NOT EXISTS input_samples (
                    id INTEGER NOT NULL PRIMARY KEY,
                    attendance_record_id TEXT NOT NULL,
                    captured_at TEXT NOT NULL,
                    active_window TEXT,
                    active_application TEXT,
                    url TEXT,
                    mouse_clicks INTEGER NOT NULL DEFAULT 0,
                    keyboard_strokes INTEGER NOT NULL DEFAULT 0,
                    is_active INTEGER NOT NULL DEFAULT 0,
                    idle_time_seconds INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY (attendance_record_id) REFERENCES attendance_records(id) ON DELETE CASCADE
                )",
                [],
            )?;

            // One attendance row per user per day
            tx.execute(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_user_date ON attendance_records(user_id, date)",
                [],
            )?;
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_lunch_breaks_record ON lunch_breaks(attendance_record_id)",
                [],
            )?;
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_activity_log_record ON activity_log(attendance_record_id)",
                [],
            )?;
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_input_samples_record ON input_samples(attendance_record_id, captured_at)",
                [],
            )?;

            Ok(())
        });

        // Version 2: scan indices for the reconcilers
        self.add_migration(2, "add_reconciler_indices", |tx| {
            // Excessive-idle query
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_attendance_state_change ON attendance_records(current_state, last_state_change_at)",
                [],
            )?;
            // End-of-day and backfill scans
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_attendance_date_checkout ON attendance_records(date, check_out_time)",
                [],
            )?;
            Ok(())
        });

        // Version 3: check-in/out metadata and free-form notes
        self.add_migration(3, "add_checkin_metadata", |tx| {
            tx.execute("ALTER TABLE attendance_records ADD COLUMN check_in_ip TEXT", [])?;
            tx.execute("ALTER TABLE attendance_records ADD COLUMN check_out_ip TEXT", [])?;
            tx.execute("ALTER TABLE attendance_records ADD COLUMN check_in_location TEXT", [])?;
            tx.execute("ALTER TABLE attendance_records ADD COLUMN check_out_location TEXT", [])?;
            tx.execute("ALTER TABLE attendance_records ADD COLUMN notes TEXT", [])?;
            Ok(())
        });
    }

    fn add_migration(&mut self, version: u32, name: &'static str, up: fn(&Transaction) -> Result<()>) {
        self.migrations.push(Migration { version, name, up });
    }

    /// Applies every pending migration in version order.
    pub fn run_migrations(&self, conn: &mut Connection) -> Result<()> {
        conn.execute(MIGRATIONS_TABLE, [])?;

        let current_version = self.get_current_version(conn)?;
        let pending: Vec<&Migration> = self.migrations.iter().filter(|m| m.version > current_version).collect();

        if pending.is_empty() {
            debug!("database schema is up to date");
            return Ok(());
        }

        let tx = conn.transaction()?;
        for migration in pending {
            info!(version = migration.version, name = migration.name, "applying migration");
            (migration.up)(&tx)?;
            tx.execute(
                "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
                params![migration.version, migration.name],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn get_current_version(&self, conn: &Connection) -> Result<u32> {
        let version: Option<u32> = conn.query_row("SELECT MAX(version) FROM migrations", [], |row| row.get(0)).unwrap_or(Some(0));
        Ok(version.unwrap_or(0))
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Brings a connection up to the latest schema version.
pub fn init_with_migrations(conn: &mut Connection) -> Result<()> {
    MigrationManager::new().run_migrations(conn)
}

/// Current schema version of the connected database.
pub fn get_db_version(conn: &Connection) -> Result<u32> {
    MigrationManager::new().get_current_version(conn)
}
