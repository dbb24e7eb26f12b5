//! Attendance state engine.
//!
//! The single place that moves a record between WORKING, IDLE and LUNCH.
//! Every transition credits the elapsed time since the previous change to
//! the counter owned by the previous state, using an atomic increment so
//! concurrent callers serialise cleanly inside their row-locking
//! transactions. The three counters are the authoritative totals.
//!
//! Transitions submitted at a time earlier than the record's
//! `last_state_change_at` are dropped, not clamped: clamping would rewrite
//! `last_state_change_at` backwards and falsify history. The anomaly is
//! logged for operators.

use crate::db::attendance::{self, AttendanceRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

/// Mutually exclusive workday states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Working,
    Idle,
    Lunch,
}

impl WorkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkState::Working => "working",
            WorkState::Idle => "idle",
            WorkState::Lunch => "lunch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "working" => Some(WorkState::Working),
            "idle" => Some(WorkState::Idle),
            "lunch" => Some(WorkState::Lunch),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter totals after the clamp rule has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedTotals {
    pub active: i64,
    pub idle: i64,
    pub lunch: i64,
}

impl ClampedTotals {
    /// Legacy mirror total: time at the desk, working or idle.
    pub fn work(&self) -> i64 {
        self.active + self.idle
    }

    pub fn tracked(&self) -> i64 {
        self.active + self.idle + self.lunch
    }
}

/// Moves the record into `new_state` at `at`, crediting the elapsed time to
/// the previous state's counter.
///
/// A record with no prior state is initialised: counters stay untouched and
/// only the new state and timestamp are written. Returns `false` when the
/// transition is rejected because `at` precedes the last state change; the
/// record is then left completely unchanged.
pub fn apply_transition(conn: &Connection, record: &mut AttendanceRecord, new_state: WorkState, at: DateTime<Utc>) -> Result<bool> {
    if let (Some(prev), Some(since)) = (record.current_state, record.last_state_change_at) {
        let delta = (at - since).num_seconds();
        if delta < 0 {
            warn!(
                record_id = %record.id,
                at = %at,
                last_change = %since,
                "transition rejected: timestamp precedes last state change"
            );
            return Ok(false);
        }
        if delta > 0 {
            attendance::add_seconds(conn, &record.id, prev, delta)?;
            credit(record, prev, delta);
        }
    }
    attendance::set_state(conn, &record.id, Some(new_state), Some(at))?;
    record.current_state = Some(new_state);
    record.last_state_change_at = Some(at);
    Ok(true)
}

/// Credits the open state's elapsed time and clears the state, leaving the
/// counters frozen. Used by check-out and all reconcilers.
///
/// Unlike a transition, finalisation always completes: a negative delta
/// credits nothing (and is logged) but the state is still cleared, because a
/// reconciler must be able to close the record.
pub fn finalize(conn: &Connection, record: &mut AttendanceRecord, at: DateTime<Utc>) -> Result<()> {
    if let (Some(prev), Some(since)) = (record.current_state, record.last_state_change_at) {
        let delta = (at - since).num_seconds();
        if delta < 0 {
            warn!(
                record_id = %record.id,
                at = %at,
                last_change = %since,
                "finalize with timestamp before last state change, crediting nothing"
            );
        } else if delta > 0 {
            attendance::add_seconds(conn, &record.id, prev, delta)?;
            credit(record, prev, delta);
        }
    }
    attendance::set_state(conn, &record.id, None, None)?;
    record.current_state = None;
    record.last_state_change_at = None;
    Ok(())
}

/// The open state's accrued-but-uncommitted seconds at `now`, for live
/// status reads. Never mutates the record.
pub fn current_duration_at(record: &AttendanceRecord, now: DateTime<Utc>) -> i64 {
    match record.last_state_change_at {
        Some(since) if record.current_state.is_some() => (now - since).num_seconds().max(0),
        _ => 0,
    }
}

/// Applies the clamp rule: the counters may not exceed the elapsed seconds
/// between check-in and check-out. Excess is trimmed from idle first, then
/// from active; lunch is explicit user intent and is never trimmed. The rule
/// is idempotent.
pub fn clamp_counters(active: i64, idle: i64, lunch: i64, elapsed: i64) -> ClampedTotals {
    let active = active.max(0);
    let idle = idle.max(0);
    let lunch = lunch.max(0);
    let mut excess = (active + idle + lunch - elapsed.max(0)).max(0);
    if excess > 0 {
        warn!(active, idle, lunch, elapsed, "counters exceed elapsed time, clamping");
    }
    let idle_cut = excess.min(idle);
    excess -= idle_cut;
    let active_cut = excess.min(active);
    ClampedTotals {
        active: active - active_cut,
        idle: idle - idle_cut,
        lunch,
    }
}

/// Clamped totals for a record being closed at `checkout_at`.
pub fn closing_totals(record: &AttendanceRecord, checkout_at: DateTime<Utc>) -> ClampedTotals {
    let elapsed = record
        .check_in_time
        .map(|check_in| (checkout_at - check_in).num_seconds().max(0))
        .unwrap_or(0);
    clamp_counters(record.active_seconds, record.idle_seconds, record.lunch_seconds, elapsed)
}

fn credit(record: &mut AttendanceRecord, state: WorkState, delta: i64) {
    match state {
        WorkState::Working => record.active_seconds += delta,
        WorkState::Idle => record.idle_seconds += delta,
        WorkState::Lunch => record.lunch_seconds += delta,
    }
}
