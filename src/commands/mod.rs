//! Command handlers for the attendance core.
//!
//! Each handler runs as a single store transaction on the caller's
//! connection and goes through the state engine, so every entry point into a
//! record speaks the same transition language:
//!
//! - [`check_in`] - Opens (or reopens) the day's record
//! - [`check_out`] - Finalises the record and freezes its counters
//! - [`breaks`] - Starts and ends lunch breaks
//! - [`heartbeat`] - Ingests one agent sample and drives transitions
//! - [`status`] - Read-only views: today's live totals and history

pub mod breaks;
pub mod check_in;
pub mod check_out;
pub mod heartbeat;
pub mod status;
