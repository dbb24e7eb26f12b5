//! Database layer for the vigil service.
//!
//! A persistence layer built on SQLite with a versioned migration system.
//! Each entity has its own module exposing parameterised queries that take a
//! borrowed connection, so the same functions run standalone or inside a
//! caller's transaction (`rusqlite::Transaction` derefs to `Connection`).
//!
//! Counter updates on attendance records are expressed as atomic
//! `counter = counter + delta` statements so that concurrent writers
//! serialise cleanly under the store's locking.

/// Core connection handling and initialization.
pub mod db;

/// Versioned schema migration system.
pub mod migrations;

/// Row/value conversion helpers shared by the entity modules.
pub mod helpers;

/// Per-user-per-day attendance records and their state counters.
pub mod attendance;

/// Lunch break audit rows tied to attendance records.
pub mod lunch_breaks;

/// Open/close audit segments written alongside state transitions.
pub mod activity_log;

/// Raw heartbeat telemetry rows.
pub mod input_samples;

/// User identities and the active flag.
pub mod users;
