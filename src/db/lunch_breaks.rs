//! Lunch break audit rows.
//!
//! At most one open break (break_end_time IS NULL) exists per attendance
//! record; the command handlers and reconcilers enforce the invariant by
//! closing before opening and by guarding on the open row.

use crate::db::helpers::{format_opt_json, format_ts, parse_opt_json, parse_opt_ts, parse_ts};
use crate::libs::clock::new_id;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const INSERT_BREAK: &str = "INSERT INTO lunch_breaks (id, attendance_record_id, break_start_time, start_location) VALUES (?1, ?2, ?3, ?4)";
const CLOSE_BREAK: &str = "UPDATE lunch_breaks SET break_end_time = ?1, duration = ?2, end_location = ?3 WHERE id = ?4 AND break_end_time IS NULL";
const SELECT_COLUMNS: &str = "id, attendance_record_id, break_start_time, break_end_time, duration, start_location, end_location";

/// Audit row for one lunch break.
#[derive(Debug, Clone)]
pub struct LunchBreak {
    pub id: String,
    pub attendance_record_id: String,
    pub break_start_time: DateTime<Utc>,
    pub break_end_time: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub start_location: Option<serde_json::Value>,
    pub end_location: Option<serde_json::Value>,
}

fn row_to_break(row: &Row) -> Result<LunchBreak> {
    let start: String = row.get("break_start_time")?;
    let end: Option<String> = row.get("break_end_time")?;
    let start_location: Option<String> = row.get("start_location")?;
    let end_location: Option<String> = row.get("end_location")?;
    Ok(LunchBreak {
        id: row.get("id")?,
        attendance_record_id: row.get("attendance_record_id")?,
        break_start_time: parse_ts(&start, "break_start_time")?,
        break_end_time: parse_opt_ts(end, "break_end_time")?,
        duration: row.get("duration")?,
        start_location: parse_opt_json(start_location, "start_location")?,
        end_location: parse_opt_json(end_location, "end_location")?,
    })
}

fn fetch_where(conn: &Connection, clause: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<LunchBreak>> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM lunch_breaks WHERE {clause}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params)?;
    let mut breaks = Vec::new();
    while let Some(row) = rows.next()? {
        breaks.push(row_to_break(row)?);
    }
    Ok(breaks)
}

/// Opens a new break for the record at `at`.
pub fn insert_start(conn: &Connection, record_id: &str, at: DateTime<Utc>, location: Option<&serde_json::Value>) -> Result<LunchBreak> {
    let lunch_break = LunchBreak {
        id: new_id(),
        attendance_record_id: record_id.to_string(),
        break_start_time: at,
        break_end_time: None,
        duration: None,
        start_location: location.cloned(),
        end_location: None,
    };
    conn.execute(
        INSERT_BREAK,
        params![lunch_break.id, record_id, format_ts(at), format_opt_json(location)],
    )?;
    Ok(lunch_break)
}

pub fn fetch_open(conn: &Connection, record_id: &str) -> Result<Option<LunchBreak>> {
    Ok(fetch_where(
        conn,
        "attendance_record_id = ?1 AND break_end_time IS NULL ORDER BY break_start_time DESC LIMIT 1",
        &[&record_id],
    )?
    .pop())
}

pub fn fetch_by_id(conn: &Connection, id: &str) -> Result<Option<LunchBreak>> {
    Ok(fetch_where(conn, "id = ?1", &[&id])?.pop())
}

pub fn fetch_for_record(conn: &Connection, record_id: &str) -> Result<Vec<LunchBreak>> {
    fetch_where(conn, "attendance_record_id = ?1 ORDER BY break_start_time", &[&record_id])
}

/// Open breaks started before `cutoff` whose attendance record is still open.
pub fn fetch_overdue(conn: &Connection, cutoff: DateTime<Utc>) -> Result<Vec<LunchBreak>> {
    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM lunch_breaks WHERE break_end_time IS NULL AND break_start_time < ?1 \
         AND attendance_record_id IN (SELECT id FROM attendance_records WHERE check_out_time IS NULL)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![format_ts(cutoff)])?;
    let mut breaks = Vec::new();
    while let Some(row) = rows.next()? {
        breaks.push(row_to_break(row)?);
    }
    Ok(breaks)
}

/// Closes a break at `end` with an explicit duration.
pub fn close(conn: &Connection, id: &str, end: DateTime<Utc>, duration: i64, location: Option<&serde_json::Value>) -> Result<()> {
    conn.execute(CLOSE_BREAK, params![format_ts(end), duration, format_opt_json(location), id])?;
    Ok(())
}

/// Closes any open break for the record at `at`; returns the closed row.
pub fn close_open_for_record(conn: &Connection, record_id: &str, at: DateTime<Utc>) -> Result<Option<LunchBreak>> {
    let Some(mut open) = fetch_open(conn, record_id)? else {
        return Ok(None);
    };
    let duration = (at - open.break_start_time).num_seconds().max(0);
    close(conn, &open.id, at, duration, None)?;
    open.break_end_time = Some(at);
    open.duration = Some(duration);
    Ok(Some(open))
}
