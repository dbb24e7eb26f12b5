use crate::db::{activity_log, attendance, lunch_breaks};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::error::{ApiError, ApiResult};
use crate::libs::state::{self, WorkState};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

/// Check-in command input.
#[derive(Debug, Clone)]
pub struct CheckInRequest {
    pub user_id: String,
    pub at: DateTime<Utc>,
    pub ip: Option<String>,
    pub location: Option<serde_json::Value>,
}

/// Marks the user in for the day.
///
/// Three paths share this handler: a brand-new day (insert), a row the daily
/// creator pre-created at midnight (claim it), and a same-day re-check-in
/// after an earlier check-out. On re-check-in the gap since the previous
/// check-out is credited to the idle counter and the check-out fields are
/// cleared; counters are never reset mid-day.
pub fn cmd(conn: &mut Connection, cache: &ActivityCache, clock: &Clock, req: CheckInRequest) -> ApiResult<attendance::AttendanceRecord> {
    let date = clock.date_of(req.at);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = match attendance::fetch_by_user_date(&tx, &req.user_id, date)? {
        Some(record) if record.check_in_time.is_some() && record.check_out_time.is_none() => {
            return Err(ApiError::AlreadyCheckedIn);
        }
        Some(mut record) if record.check_out_time.is_some() => {
            // Same-day re-check-in: the time away counts as idle.
            lunch_breaks::close_open_for_record(&tx, &record.id, req.at)?;
            let checked_out_at = record.check_out_time.unwrap_or(req.at);
            let gap = (req.at - checked_out_at).num_seconds().max(0);
            if gap > 0 {
                attendance::add_seconds(&tx, &record.id, WorkState::Idle, gap)?;
                record.idle_seconds += gap;
            }
            attendance::clear_check_out(&tx, &record.id)?;
            record.check_out_time = None;
            record.check_out_ip = None;
            record.check_out_location = None;
            record.total_work_duration = None;
            record.total_active_duration = None;
            record.total_idle_duration = None;
            record.total_break_duration = None;
            info!(user_id = %req.user_id, %date, gap_seconds = gap, "re-check-in after same-day check-out");
            record
        }
        Some(mut record) => {
            // Pre-created empty row from the daily attendance creator.
            attendance::set_check_in(&tx, &record.id, req.at, req.ip.as_deref(), req.location.as_ref())?;
            record.check_in_time = Some(req.at);
            record.check_in_ip = req.ip.clone();
            record.check_in_location = req.location.clone();
            record
        }
        None => {
            let mut record = attendance::AttendanceRecord::new(&req.user_id, date, req.at);
            record.check_in_ip = req.ip.clone();
            record.check_in_location = req.location.clone();
            attendance::insert(&tx, &record)?;
            record
        }
    };

    state::apply_transition(&tx, &mut record, WorkState::Working, req.at)?;
    activity_log::close_open(&tx, &record.id, req.at)?;
    activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::Active, req.at)?;

    tx.commit()?;

    cache.set_state(&req.user_id, record.current_state);
    cache.set_snapshot(&req.user_id, &record);
    info!(user_id = %req.user_id, %date, "checked in");
    Ok(record)
}
