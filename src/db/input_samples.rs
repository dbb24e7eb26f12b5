//! Raw heartbeat telemetry rows.
//!
//! One row per received heartbeat, kept for metrics. The rows are not
//! authoritative for state; the end-of-day closer only consults the latest
//! timestamp to decide whether a WORKING tail is unexplained.

use crate::db::helpers::{format_ts, parse_ts};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

const INSERT_SAMPLE: &str = "INSERT INTO input_samples \
    (attendance_record_id, captured_at, active_window, active_application, url, mouse_clicks, keyboard_strokes, is_active, idle_time_seconds) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";
const SELECT_LAST_CAPTURED: &str = "SELECT captured_at FROM input_samples WHERE attendance_record_id = ?1 ORDER BY captured_at DESC LIMIT 1";
const COUNT_FOR_RECORD: &str = "SELECT COUNT(*) FROM input_samples WHERE attendance_record_id = ?1";

/// Client-reported heartbeat payload.
///
/// `mouse_clicks + keyboard_strokes > 0` is the authoritative input signal;
/// `is_active` and `idle_time_seconds` are the client's own estimates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSample {
    pub active_window: Option<String>,
    pub active_application: Option<String>,
    pub url: Option<String>,
    pub mouse_clicks: i64,
    pub keyboard_strokes: i64,
    pub is_active: bool,
    pub idle_time_seconds: i64,
}

impl InputSample {
    pub fn has_input(&self) -> bool {
        self.mouse_clicks + self.keyboard_strokes > 0
    }
}

pub fn insert(conn: &Connection, record_id: &str, captured_at: DateTime<Utc>, sample: &InputSample) -> Result<()> {
    conn.execute(
        INSERT_SAMPLE,
        params![
            record_id,
            format_ts(captured_at),
            sample.active_window,
            sample.active_application,
            sample.url,
            sample.mouse_clicks,
            sample.keyboard_strokes,
            sample.is_active,
            sample.idle_time_seconds,
        ],
    )?;
    Ok(())
}

/// Timestamp of the most recent sample for the record.
pub fn last_captured_at(conn: &Connection, record_id: &str) -> Result<Option<DateTime<Utc>>> {
    let captured: Option<String> = conn
        .query_row(SELECT_LAST_CAPTURED, params![record_id], |row| row.get(0))
        .optional()?;
    captured.map(|ts| parse_ts(&ts, "captured_at")).transpose()
}

pub fn count_for_record(conn: &Connection, record_id: &str) -> Result<i64> {
    let count: i64 = conn.query_row(COUNT_FOR_RECORD, params![record_id], |row| row.get(0))?;
    Ok(count)
}
