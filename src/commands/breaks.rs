use crate::db::{activity_log, attendance, lunch_breaks};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::error::{ApiError, ApiResult};
use crate::libs::state::{self, WorkState};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

/// Break command input, shared by start and end.
#[derive(Debug, Clone)]
pub struct BreakRequest {
    pub user_id: String,
    pub at: DateTime<Utc>,
    pub location: Option<serde_json::Value>,
}

/// Starts a lunch break.
///
/// Requires a checked-in record in WORKING or IDLE with no open break.
pub fn start(conn: &mut Connection, cache: &ActivityCache, clock: &Clock, req: BreakRequest) -> ApiResult<lunch_breaks::LunchBreak> {
    let date = clock.date_of(req.at);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = match attendance::fetch_by_user_date(&tx, &req.user_id, date)? {
        Some(record) if record.is_checked_in() => record,
        _ => return Err(ApiError::NotCheckedIn),
    };

    if record.current_state == Some(WorkState::Lunch) || lunch_breaks::fetch_open(&tx, &record.id)?.is_some() {
        return Err(ApiError::BreakAlreadyStarted);
    }

    if !state::apply_transition(&tx, &mut record, WorkState::Lunch, req.at)? {
        return Err(ApiError::Internal(anyhow!("break start predates the record's last state change")));
    }
    activity_log::close_open(&tx, &record.id, req.at)?;
    activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::LunchBreak, req.at)?;
    let lunch_break = lunch_breaks::insert_start(&tx, &record.id, req.at, req.location.as_ref())?;

    tx.commit()?;

    cache.set_state(&req.user_id, record.current_state);
    cache.set_snapshot(&req.user_id, &record);
    info!(user_id = %req.user_id, %date, "lunch break started");
    Ok(lunch_break)
}

/// Ends the open lunch break and returns the record to WORKING.
pub fn end(conn: &mut Connection, cache: &ActivityCache, clock: &Clock, req: BreakRequest) -> ApiResult<lunch_breaks::LunchBreak> {
    let date = clock.date_of(req.at);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = match attendance::fetch_by_user_date(&tx, &req.user_id, date)? {
        Some(record) if record.is_checked_in() => record,
        _ => return Err(ApiError::NotCheckedIn),
    };

    let Some(mut open) = lunch_breaks::fetch_open(&tx, &record.id)? else {
        return Err(ApiError::NoActiveBreak);
    };

    if !state::apply_transition(&tx, &mut record, WorkState::Working, req.at)? {
        return Err(ApiError::Internal(anyhow!("break end predates the record's last state change")));
    }
    let duration = (req.at - open.break_start_time).num_seconds().max(0);
    lunch_breaks::close(&tx, &open.id, req.at, duration, req.location.as_ref())?;
    open.break_end_time = Some(req.at);
    open.duration = Some(duration);
    open.end_location = req.location.clone();
    activity_log::close_open(&tx, &record.id, req.at)?;
    activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::Active, req.at)?;

    tx.commit()?;

    cache.set_state(&req.user_id, record.current_state);
    cache.set_snapshot(&req.user_id, &record);
    info!(user_id = %req.user_id, %date, duration_seconds = duration, "lunch break ended");
    Ok(open)
}
