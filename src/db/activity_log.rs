//! Activity audit segments.
//!
//! Open/close segments of type active, idle or lunch_break, written
//! alongside state transitions. One segment is open at a time per record.
//! The segments are an audit trail for UIs; totals are never recomputed
//! from them.

use crate::db::helpers::{format_ts, parse_opt_ts, parse_ts};
use crate::libs::state::WorkState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

const INSERT_SEGMENT: &str = "INSERT INTO activity_log (attendance_record_id, segment_type, started_at) VALUES (?1, ?2, ?3)";
const CLOSE_OPEN_SEGMENTS: &str = "UPDATE activity_log SET ended_at = ?1 WHERE attendance_record_id = ?2 AND ended_at IS NULL";
const SELECT_FOR_RECORD: &str =
    "SELECT id, attendance_record_id, segment_type, started_at, ended_at FROM activity_log WHERE attendance_record_id = ?1 ORDER BY started_at, id";

/// Kind of audit segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Active,
    Idle,
    LunchBreak,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Active => "active",
            SegmentKind::Idle => "idle",
            SegmentKind::LunchBreak => "lunch_break",
        }
    }
}

impl From<WorkState> for SegmentKind {
    fn from(state: WorkState) -> Self {
        match state {
            WorkState::Working => SegmentKind::Active,
            WorkState::Idle => SegmentKind::Idle,
            WorkState::Lunch => SegmentKind::LunchBreak,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActivitySegment {
    pub id: i64,
    pub attendance_record_id: String,
    pub segment_type: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

fn row_to_segment(row: &Row) -> Result<ActivitySegment> {
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    Ok(ActivitySegment {
        id: row.get("id")?,
        attendance_record_id: row.get("attendance_record_id")?,
        segment_type: row.get("segment_type")?,
        started_at: parse_ts(&started_at, "started_at")?,
        ended_at: parse_opt_ts(ended_at, "ended_at")?,
    })
}

/// Opens a new segment at `at`. Callers close the previous one first.
pub fn open_segment(conn: &Connection, record_id: &str, kind: SegmentKind, at: DateTime<Utc>) -> Result<()> {
    conn.execute(INSERT_SEGMENT, params![record_id, kind.as_str(), format_ts(at)])?;
    Ok(())
}

/// Closes every open segment for the record at `at`.
pub fn close_open(conn: &Connection, record_id: &str, at: DateTime<Utc>) -> Result<usize> {
    let closed = conn.execute(CLOSE_OPEN_SEGMENTS, params![format_ts(at), record_id])?;
    Ok(closed)
}

pub fn fetch_for_record(conn: &Connection, record_id: &str) -> Result<Vec<ActivitySegment>> {
    let mut stmt = conn.prepare(SELECT_FOR_RECORD)?;
    let mut rows = stmt.query(params![record_id])?;
    let mut segments = Vec::new();
    while let Some(row) = rows.next()? {
        segments.push(row_to_segment(row)?);
    }
    Ok(segments)
}
