//! Attendance record storage.
//!
//! One row per (user, date). The three state counters are the authoritative
//! totals; they only ever grow through the atomic `counter = counter + delta`
//! statements issued by the state engine, never by summing audit rows.

use crate::db::helpers::{format_date, format_opt_json, format_opt_ts, format_ts, parse_date, parse_opt_json, parse_opt_ts};
use crate::libs::clock::new_id;
use crate::libs::state::{ClampedTotals, WorkState};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use tracing::warn;

const COLUMNS: &str = "id, user_id, date, check_in_time, check_out_time, current_state, last_state_change_at, \
    active_seconds, idle_seconds, lunch_seconds, \
    total_work_duration, total_active_duration, total_idle_duration, total_break_duration, \
    check_in_ip, check_out_ip, check_in_location, check_out_location, notes";

const INSERT_RECORD: &str = "INSERT INTO attendance_records \
    (id, user_id, date, check_in_time, check_in_ip, check_in_location) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const INSERT_EMPTY: &str = "INSERT OR IGNORE INTO attendance_records (id, user_id, date) VALUES (?1, ?2, ?3)";
const ADD_ACTIVE_SECONDS: &str = "UPDATE attendance_records SET active_seconds = active_seconds + ?1 WHERE id = ?2";
const ADD_IDLE_SECONDS: &str = "UPDATE attendance_records SET idle_seconds = idle_seconds + ?1 WHERE id = ?2";
const ADD_LUNCH_SECONDS: &str = "UPDATE attendance_records SET lunch_seconds = lunch_seconds + ?1 WHERE id = ?2";
const SET_STATE: &str = "UPDATE attendance_records SET current_state = ?1, last_state_change_at = ?2 WHERE id = ?3";
const SET_CHECK_IN: &str = "UPDATE attendance_records SET check_in_time = ?1, check_in_ip = ?2, check_in_location = ?3 WHERE id = ?4";
const SET_CHECK_OUT: &str = "UPDATE attendance_records SET check_out_time = ?1, check_out_ip = ?2, check_out_location = ?3, \
    notes = COALESCE(?4, notes), total_work_duration = ?5, total_active_duration = ?6, total_idle_duration = ?7, \
    total_break_duration = ?8 WHERE id = ?9";
const CLEAR_CHECK_OUT: &str = "UPDATE attendance_records SET check_out_time = NULL, check_out_ip = NULL, \
    check_out_location = NULL, total_work_duration = NULL, total_active_duration = NULL, total_idle_duration = NULL, \
    total_break_duration = NULL WHERE id = ?1";

/// Per-user-per-day attendance container.
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub current_state: Option<WorkState>,
    pub last_state_change_at: Option<DateTime<Utc>>,
    pub active_seconds: i64,
    pub idle_seconds: i64,
    pub lunch_seconds: i64,
    pub total_work_duration: Option<i64>,
    pub total_active_duration: Option<i64>,
    pub total_idle_duration: Option<i64>,
    pub total_break_duration: Option<i64>,
    pub check_in_ip: Option<String>,
    pub check_out_ip: Option<String>,
    pub check_in_location: Option<serde_json::Value>,
    pub check_out_location: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl AttendanceRecord {
    /// A fresh record checked in at `at`.
    pub fn new(user_id: &str, date: NaiveDate, at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.to_string(),
            date,
            check_in_time: Some(at),
            check_out_time: None,
            current_state: None,
            last_state_change_at: None,
            active_seconds: 0,
            idle_seconds: 0,
            lunch_seconds: 0,
            total_work_duration: None,
            total_active_duration: None,
            total_idle_duration: None,
            total_break_duration: None,
            check_in_ip: None,
            check_out_ip: None,
            check_in_location: None,
            check_out_location: None,
            notes: None,
        }
    }

    pub fn is_checked_in(&self) -> bool {
        self.check_in_time.is_some() && self.check_out_time.is_none()
    }
}

fn row_to_record(row: &Row) -> Result<AttendanceRecord> {
    let id: String = row.get("id")?;
    let date: String = row.get("date")?;
    let check_in_time: Option<String> = row.get("check_in_time")?;
    let check_out_time: Option<String> = row.get("check_out_time")?;
    let state: Option<String> = row.get("current_state")?;
    let last_state_change_at: Option<String> = row.get("last_state_change_at")?;
    let check_in_location: Option<String> = row.get("check_in_location")?;
    let check_out_location: Option<String> = row.get("check_out_location")?;

    let current_state = state.as_deref().map(|s| match WorkState::parse(s) {
        Some(state) => state,
        None => {
            // Unknown state strings bill as idle rather than poison the row.
            warn!(record_id = %id, state = s, "unknown attendance state in store, treating as idle");
            WorkState::Idle
        }
    });

    Ok(AttendanceRecord {
        user_id: row.get("user_id")?,
        date: parse_date(&date, "date")?,
        check_in_time: parse_opt_ts(check_in_time, "check_in_time")?,
        check_out_time: parse_opt_ts(check_out_time, "check_out_time")?,
        current_state,
        last_state_change_at: parse_opt_ts(last_state_change_at, "last_state_change_at")?,
        active_seconds: row.get("active_seconds")?,
        idle_seconds: row.get("idle_seconds")?,
        lunch_seconds: row.get("lunch_seconds")?,
        total_work_duration: row.get("total_work_duration")?,
        total_active_duration: row.get("total_active_duration")?,
        total_idle_duration: row.get("total_idle_duration")?,
        total_break_duration: row.get("total_break_duration")?,
        check_in_ip: row.get("check_in_ip")?,
        check_out_ip: row.get("check_out_ip")?,
        check_in_location: parse_opt_json(check_in_location, "check_in_location")?,
        check_out_location: parse_opt_json(check_out_location, "check_out_location")?,
        notes: row.get("notes")?,
        id,
    })
}

fn fetch_where(conn: &Connection, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<AttendanceRecord>> {
    let sql = format!("SELECT {COLUMNS} FROM attendance_records WHERE {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params)?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(row_to_record(row)?);
    }
    Ok(records)
}

pub fn insert(conn: &Connection, record: &AttendanceRecord) -> Result<()> {
    conn.execute(
        INSERT_RECORD,
        params![
            record.id,
            record.user_id,
            format_date(record.date),
            format_opt_ts(record.check_in_time),
            record.check_in_ip,
            format_opt_json(record.check_in_location.as_ref()),
        ],
    )?;
    Ok(())
}

/// Pre-creates an empty row for the day; returns false when one exists.
pub fn create_empty(conn: &Connection, user_id: &str, date: NaiveDate) -> Result<bool> {
    let inserted = conn.execute(INSERT_EMPTY, params![new_id(), user_id, format_date(date)])?;
    Ok(inserted > 0)
}

pub fn fetch_by_user_date(conn: &Connection, user_id: &str, date: NaiveDate) -> Result<Option<AttendanceRecord>> {
    Ok(fetch_where(conn, "user_id = ?1 AND date = ?2", &[&user_id, &format_date(date)])?.pop())
}

pub fn fetch_by_id(conn: &Connection, id: &str) -> Result<Option<AttendanceRecord>> {
    Ok(fetch_where(conn, "id = ?1", &[&id])?.pop())
}

/// History for a user, newest first, optionally bounded by dates.
pub fn fetch_history(conn: &Connection, user_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Vec<AttendanceRecord>> {
    let start = start.map(format_date);
    let end = end.map(format_date);
    fetch_where(
        conn,
        "user_id = ?1 AND (?2 IS NULL OR date >= ?2) AND (?3 IS NULL OR date <= ?3) ORDER BY date DESC",
        &[&user_id, &start, &end],
    )
}

/// Checked-in records for the day that have not checked out yet.
pub fn fetch_open_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
    fetch_where(
        conn,
        "date = ?1 AND check_in_time IS NOT NULL AND check_out_time IS NULL",
        &[&format_date(date)],
    )
}

/// Still-open records from days before `date`, for the startup backfill.
pub fn fetch_open_before(conn: &Connection, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
    fetch_where(
        conn,
        "date < ?1 AND check_in_time IS NOT NULL AND check_out_time IS NULL",
        &[&format_date(date)],
    )
}

/// Records idle since before `cutoff`, candidates for the excessive-idle closer.
pub fn fetch_idle_since(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<AttendanceRecord>> {
    fetch_where(
        conn,
        "current_state = 'idle' AND last_state_change_at < ?1 AND check_out_time IS NULL",
        &[&format_ts(cutoff)],
    )
}

/// WORKING/IDLE records for the day, candidates for the gap detector.
pub fn fetch_active_for_date(conn: &Connection, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
    fetch_where(
        conn,
        "date = ?1 AND check_out_time IS NULL AND current_state IN ('working', 'idle')",
        &[&format_date(date)],
    )
}

/// Atomically credits `delta` seconds to the counter owned by `state`.
pub fn add_seconds(conn: &Connection, id: &str, state: WorkState, delta: i64) -> Result<()> {
    let sql = match state {
        WorkState::Working => ADD_ACTIVE_SECONDS,
        WorkState::Idle => ADD_IDLE_SECONDS,
        WorkState::Lunch => ADD_LUNCH_SECONDS,
    };
    conn.execute(sql, params![delta, id])?;
    Ok(())
}

pub fn set_state(conn: &Connection, id: &str, state: Option<WorkState>, at: Option<DateTime<Utc>>) -> Result<()> {
    conn.execute(SET_STATE, params![state.map(|s| s.as_str()), format_opt_ts(at), id])?;
    Ok(())
}

pub fn set_check_in(conn: &Connection, id: &str, at: DateTime<Utc>, ip: Option<&str>, location: Option<&serde_json::Value>) -> Result<()> {
    conn.execute(SET_CHECK_IN, params![format_ts(at), ip, format_opt_json(location), id])?;
    Ok(())
}

pub fn set_check_out(
    conn: &Connection,
    id: &str,
    at: DateTime<Utc>,
    ip: Option<&str>,
    location: Option<&serde_json::Value>,
    notes: Option<&str>,
    totals: &ClampedTotals,
) -> Result<()> {
    conn.execute(
        SET_CHECK_OUT,
        params![
            format_ts(at),
            ip,
            format_opt_json(location),
            notes,
            totals.work(),
            totals.active,
            totals.idle,
            totals.lunch,
            id
        ],
    )?;
    Ok(())
}

/// Reverts a same-day check-out so the user can check back in.
pub fn clear_check_out(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(CLEAR_CHECK_OUT, params![id])?;
    Ok(())
}
