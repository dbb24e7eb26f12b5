//! Read-only attendance views.
//!
//! Neither operation mutates state. Live figures add the open state's
//! accrued-but-uncommitted duration to the matching counter; history
//! presents past-day open records as if they had been closed at their own
//! end-of-day, with the clamp rule applied on read.

use crate::db::attendance::{self, AttendanceRecord};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::error::ApiResult;
use crate::libs::state::{self, WorkState};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

/// Live totals for today's open record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTotals {
    pub active: i64,
    pub idle: i64,
    pub lunch: i64,
    pub tracked: i64,
}

/// Today's record together with its live totals.
#[derive(Debug, Clone)]
pub struct TodayAttendance {
    pub record: AttendanceRecord,
    pub live: LiveTotals,
}

/// Today's attendance with live counters, or None before any row exists.
pub fn today(conn: &Connection, cache: &ActivityCache, clock: &Clock, user_id: &str, now: DateTime<Utc>) -> ApiResult<Option<TodayAttendance>> {
    let date = clock.date_of(now);
    let Some(record) = attendance::fetch_by_user_date(conn, user_id, date)? else {
        return Ok(None);
    };

    let mut active = record.active_seconds;
    let mut idle = record.idle_seconds;
    let mut lunch = record.lunch_seconds;
    let pending = state::current_duration_at(&record, now);
    match record.current_state {
        Some(WorkState::Working) => active += pending,
        Some(WorkState::Idle) => idle += pending,
        Some(WorkState::Lunch) => lunch += pending,
        None => {}
    }

    // Guard the view against drifted counters; the store is untouched.
    let live = match record.check_in_time {
        Some(check_in) => {
            let elapsed_until = record.check_out_time.unwrap_or(now);
            let totals = state::clamp_counters(active, idle, lunch, (elapsed_until - check_in).num_seconds());
            LiveTotals {
                active: totals.active,
                idle: totals.idle,
                lunch: totals.lunch,
                tracked: totals.tracked(),
            }
        }
        None => LiveTotals {
            active,
            idle,
            lunch,
            tracked: active + idle + lunch,
        },
    };

    cache.set_snapshot(user_id, &record);
    Ok(Some(TodayAttendance { record, live }))
}

/// Attendance history, newest first.
///
/// Past-day records that were never closed are capped at their own
/// end-of-day: the open state's tail up to end-of-day is added to its
/// counter and the clamp rule applied, all in the returned view only.
pub fn history(
    conn: &Connection,
    clock: &Clock,
    user_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> ApiResult<Vec<AttendanceRecord>> {
    let mut records = attendance::fetch_history(conn, user_id, start, end)?;

    for record in &mut records {
        let Some(check_in) = record.check_in_time else {
            continue;
        };
        match record.check_out_time {
            Some(check_out) => {
                let totals = state::clamp_counters(
                    record.active_seconds,
                    record.idle_seconds,
                    record.lunch_seconds,
                    (check_out - check_in).num_seconds(),
                );
                record.active_seconds = totals.active;
                record.idle_seconds = totals.idle;
                record.lunch_seconds = totals.lunch;
            }
            None if record.date < today => {
                let end_of_day = clock.end_of_day(record.date);
                let pending = state::current_duration_at(record, end_of_day);
                match record.current_state {
                    Some(WorkState::Working) => record.active_seconds += pending,
                    Some(WorkState::Idle) => record.idle_seconds += pending,
                    Some(WorkState::Lunch) => record.lunch_seconds += pending,
                    None => {}
                }
                let totals = state::clamp_counters(
                    record.active_seconds,
                    record.idle_seconds,
                    record.lunch_seconds,
                    (end_of_day - check_in).num_seconds(),
                );
                record.active_seconds = totals.active;
                record.idle_seconds = totals.idle;
                record.lunch_seconds = totals.lunch;
            }
            None => {}
        }
    }

    Ok(records)
}
