//! # Vigil - Workday Attendance Tracking Service
//!
//! A service core that tracks per-user workday state for a fleet of desktop
//! agents emitting periodic activity heartbeats.
//!
//! ## Features
//!
//! - **Attendance State Machine**: One record per user per day accumulating
//!   WORKING, IDLE and LUNCH time with no double counting
//! - **Heartbeat Ingestion**: Classifies agent samples (input, idle, gap,
//!   dead) and drives state transitions, including retroactive idle
//! - **Commands**: Check-in, check-out, start-break, end-break, each a
//!   single store transaction
//! - **Reconcilers**: Scheduled jobs that cap runaway breaks and idle
//!   stretches, detect silent agents, close the day and backfill missed days
//! - **Advisory Cache**: Best-effort activity cache for the hot heartbeat
//!   path; the store stays the single source of truth
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil::api::AttendanceApi;
//! use vigil::libs::config::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let api = AttendanceApi::new(Config::read()?)?;
//!     api.startup_backfill()?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod commands;
pub mod db;
pub mod libs;
