use crate::db::{activity_log, attendance, lunch_breaks};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::error::{ApiError, ApiResult};
use crate::libs::state;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

/// Check-out command input.
#[derive(Debug, Clone)]
pub struct CheckOutRequest {
    pub user_id: String,
    pub at: DateTime<Utc>,
    pub ip: Option<String>,
    pub location: Option<serde_json::Value>,
    pub reason: Option<String>,
}

/// Finalises the day's record.
///
/// Credits the open state's elapsed time, clears the state, closes any open
/// audit segment and lunch break at the check-out time, and writes the
/// legacy mirror totals derived from the (clamped) counters. The counters
/// themselves stay frozen as accumulated.
pub fn cmd(conn: &mut Connection, cache: &ActivityCache, clock: &Clock, req: CheckOutRequest) -> ApiResult<attendance::AttendanceRecord> {
    let date = clock.date_of(req.at);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = match attendance::fetch_by_user_date(&tx, &req.user_id, date)? {
        None => return Err(ApiError::NotCheckedIn),
        Some(record) if record.check_in_time.is_none() => return Err(ApiError::NotCheckedIn),
        Some(record) if record.check_out_time.is_some() => return Err(ApiError::AlreadyCheckedOut),
        Some(record) => record,
    };

    state::finalize(&tx, &mut record, req.at)?;
    activity_log::close_open(&tx, &record.id, req.at)?;
    lunch_breaks::close_open_for_record(&tx, &record.id, req.at)?;

    let totals = state::closing_totals(&record, req.at);
    attendance::set_check_out(
        &tx,
        &record.id,
        req.at,
        req.ip.as_deref(),
        req.location.as_ref(),
        req.reason.as_deref(),
        &totals,
    )?;
    record.check_out_time = Some(req.at);
    record.check_out_ip = req.ip.clone();
    record.check_out_location = req.location.clone();
    if req.reason.is_some() {
        record.notes = req.reason.clone();
    }
    record.total_work_duration = Some(totals.work());
    record.total_active_duration = Some(totals.active);
    record.total_idle_duration = Some(totals.idle);
    record.total_break_duration = Some(totals.lunch);

    tx.commit()?;

    cache.remove(&req.user_id);
    info!(user_id = %req.user_id, %date, work_seconds = totals.work(), "checked out");
    Ok(record)
}
