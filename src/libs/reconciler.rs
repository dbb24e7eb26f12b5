//! Scheduled reconciliation jobs.
//!
//! Each reconciler enforces one invariant over records whose owning agents
//! stopped cooperating: lunch breaks are capped at two hours, idle stretches
//! at thirty minutes, silent agents are checked out, and any record still
//! open at end-of-day is closed. The startup backfill applies the end-of-day
//! closer to records from previous days, and the daily creator pre-creates
//! empty rows at midnight.
//!
//! Every record is processed in its own transaction through the state
//! engine, so a failure on one record is logged and the batch continues.
//! All guards re-check their predicate after taking the row lock, which
//! makes a second run over the same records a no-op.

use crate::commands::check_out::{self, CheckOutRequest};
use crate::db::db::Db;
use crate::db::{activity_log, attendance, input_samples, lunch_breaks, users};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::config::TrackerConfig;
use crate::libs::state::{self, WorkState};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::TransactionBehavior;
use tracing::{info, warn};

/// Caps lunch breaks that have run past the configured maximum and closes
/// their records at the capped break end.
pub fn close_excessive_breaks(db: &Db, cache: &ActivityCache, cfg: &TrackerConfig, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - Duration::seconds(cfg.max_lunch_secs);
    let overdue = {
        let conn = db.conn();
        lunch_breaks::fetch_overdue(&conn, cutoff)?
    };

    let mut closed = 0;
    for stale in overdue {
        match close_overdue_break(db, cache, cfg, &stale.id) {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => warn!(break_id = %stale.id, error = %e, "excessive-break closer failed for record"),
        }
    }
    Ok(closed)
}

fn close_overdue_break(db: &Db, cache: &ActivityCache, cfg: &TrackerConfig, break_id: &str) -> Result<bool> {
    let mut conn = db.conn();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Re-check under the lock; a parallel end-break or check-out wins.
    let Some(open) = lunch_breaks::fetch_by_id(&tx, break_id)? else {
        return Ok(false);
    };
    if open.break_end_time.is_some() {
        return Ok(false);
    }
    let Some(mut record) = attendance::fetch_by_id(&tx, &open.attendance_record_id)? else {
        return Ok(false);
    };
    if record.check_out_time.is_some() {
        return Ok(false);
    }

    let break_end = open.break_start_time + Duration::seconds(cfg.max_lunch_secs);
    lunch_breaks::close(&tx, &open.id, break_end, cfg.max_lunch_secs, None)?;
    activity_log::close_open(&tx, &record.id, break_end)?;
    state::finalize(&tx, &mut record, break_end)?;
    let totals = state::closing_totals(&record, break_end);
    attendance::set_check_out(
        &tx,
        &record.id,
        break_end,
        None,
        None,
        Some("auto checkout: lunch break exceeded the cap"),
        &totals,
    )?;
    tx.commit()?;

    cache.remove(&record.user_id);
    info!(user_id = %record.user_id, date = %record.date, "capped runaway lunch break and checked out");
    Ok(true)
}

/// Checks out records that have sat in IDLE past the configured maximum,
/// crediting exactly the capped idle stretch.
pub fn close_excessive_idle(db: &Db, cache: &ActivityCache, cfg: &TrackerConfig, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = now - Duration::seconds(cfg.max_idle_secs);
    let candidates = {
        let conn = db.conn();
        attendance::fetch_idle_since(&conn, cutoff)?
    };

    let mut closed = 0;
    for candidate in candidates {
        match close_idle_record(db, cache, cfg, &candidate.id, now) {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => warn!(record_id = %candidate.id, error = %e, "excessive-idle closer failed for record"),
        }
    }
    Ok(closed)
}

fn close_idle_record(db: &Db, cache: &ActivityCache, cfg: &TrackerConfig, record_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let mut conn = db.conn();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut record) = attendance::fetch_by_id(&tx, record_id)? else {
        return Ok(false);
    };
    if record.check_out_time.is_some() || record.current_state != Some(WorkState::Idle) {
        return Ok(false);
    }
    let Some(idle_since) = record.last_state_change_at else {
        return Ok(false);
    };
    if (now - idle_since).num_seconds() <= cfg.max_idle_secs {
        return Ok(false);
    }

    let checkout_at = idle_since + Duration::seconds(cfg.max_idle_secs);
    activity_log::close_open(&tx, &record.id, checkout_at)?;
    lunch_breaks::close_open_for_record(&tx, &record.id, checkout_at)?;
    state::finalize(&tx, &mut record, checkout_at)?;
    let totals = state::closing_totals(&record, checkout_at);
    attendance::set_check_out(
        &tx,
        &record.id,
        checkout_at,
        None,
        None,
        Some("auto checkout: idle past the cap"),
        &totals,
    )?;
    tx.commit()?;

    cache.remove(&record.user_id);
    info!(user_id = %record.user_id, date = %record.date, "idle past the cap, checked out");
    Ok(true)
}

/// Watches checked-in records whose agents have gone quiet.
///
/// A record with no cached heartbeat is skipped (startup grace). Past the
/// auto-checkout threshold the record is checked out shortly after its last
/// heartbeat; past the idle threshold a WORKING record is moved to IDLE,
/// double-checking the state after taking the lock to avoid racing a
/// heartbeat that arrived in between.
pub fn detect_gaps(db: &Db, cache: &ActivityCache, clock: &Clock, cfg: &TrackerConfig, now: DateTime<Utc>) -> Result<usize> {
    let today = clock.date_of(now);
    let candidates = {
        let conn = db.conn();
        attendance::fetch_active_for_date(&conn, today)?
    };

    let mut touched = 0;
    for candidate in candidates {
        let Some(activity) = cache.activity(&candidate.user_id) else {
            continue;
        };
        let silent = (now - activity.last_heartbeat).num_seconds();

        if silent > cfg.auto_checkout_after_secs {
            let at = activity.last_heartbeat + Duration::seconds(cfg.gap_checkout_offset_secs);
            let req = CheckOutRequest {
                user_id: candidate.user_id.clone(),
                at,
                ip: None,
                location: None,
                reason: Some("auto checkout: agent went silent".to_string()),
            };
            let mut conn = db.conn();
            match check_out::cmd(&mut conn, cache, clock, req) {
                Ok(_) => touched += 1,
                // Someone else closed the record first; nothing to do.
                Err(e) if e.is_domain_rejection() => {}
                Err(e) => warn!(user_id = %candidate.user_id, error = %e, "gap detector check-out failed"),
            }
        } else if silent > cfg.idle_after_secs && candidate.current_state == Some(WorkState::Working) {
            let at = activity.last_heartbeat + Duration::seconds(cfg.idle_after_secs);
            match idle_silent_record(db, cache, &candidate.id, at) {
                Ok(true) => touched += 1,
                Ok(false) => {}
                Err(e) => warn!(record_id = %candidate.id, error = %e, "gap detector transition failed"),
            }
        }
    }
    Ok(touched)
}

fn idle_silent_record(db: &Db, cache: &ActivityCache, record_id: &str, at: DateTime<Utc>) -> Result<bool> {
    let mut conn = db.conn();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut record) = attendance::fetch_by_id(&tx, record_id)? else {
        return Ok(false);
    };
    if record.check_out_time.is_some() || record.current_state != Some(WorkState::Working) {
        return Ok(false);
    }
    if !state::apply_transition(&tx, &mut record, WorkState::Idle, at)? {
        return Ok(false);
    }
    activity_log::close_open(&tx, &record.id, at)?;
    activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::Idle, at)?;
    tx.commit()?;

    cache.set_state(&record.user_id, record.current_state);
    cache.set_snapshot(&record.user_id, &record);
    Ok(true)
}

/// Closes every record of `date` still open at that date's end-of-day.
pub fn close_day(db: &Db, cache: &ActivityCache, clock: &Clock, cfg: &TrackerConfig, date: NaiveDate) -> Result<usize> {
    let candidates = {
        let conn = db.conn();
        attendance::fetch_open_for_date(&conn, date)?
    };

    let mut closed = 0;
    for candidate in candidates {
        match close_record_at_end_of_day(db, cache, clock, cfg, &candidate.id, date) {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => warn!(record_id = %candidate.id, error = %e, "end-of-day closer failed for record"),
        }
    }
    Ok(closed)
}

/// Applies the end-of-day closer to every record left open on previous
/// days, each at its own end-of-day. Run at process start.
pub fn backfill(db: &Db, cache: &ActivityCache, clock: &Clock, cfg: &TrackerConfig, today: NaiveDate) -> Result<usize> {
    let candidates = {
        let conn = db.conn();
        attendance::fetch_open_before(&conn, today)?
    };

    let mut closed = 0;
    for candidate in candidates {
        match close_record_at_end_of_day(db, cache, clock, cfg, &candidate.id, candidate.date) {
            Ok(true) => closed += 1,
            Ok(false) => {}
            Err(e) => warn!(record_id = %candidate.id, error = %e, "backfill failed for record"),
        }
    }
    if closed > 0 {
        info!(closed, "backfilled records left open on previous days");
    }
    Ok(closed)
}

fn close_record_at_end_of_day(db: &Db, cache: &ActivityCache, clock: &Clock, cfg: &TrackerConfig, record_id: &str, date: NaiveDate) -> Result<bool> {
    let end_of_day = clock.end_of_day(date);
    let mut conn = db.conn();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut record) = attendance::fetch_by_id(&tx, record_id)? else {
        return Ok(false);
    };
    if record.check_in_time.is_none() || record.check_out_time.is_some() {
        return Ok(false);
    }

    // A WORKING record whose agent stopped sampling well before end-of-day
    // has an unexplained tail; bill it as idle from the last sample on.
    if record.current_state == Some(WorkState::Working) {
        if let Some(last_sample) = input_samples::last_captured_at(&tx, &record.id)? {
            if (end_of_day - last_sample).num_seconds() > cfg.eod_input_grace_secs
                && state::apply_transition(&tx, &mut record, WorkState::Idle, last_sample)?
            {
                activity_log::close_open(&tx, &record.id, last_sample)?;
                activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::Idle, last_sample)?;
            }
        }
    }

    lunch_breaks::close_open_for_record(&tx, &record.id, end_of_day)?;
    activity_log::close_open(&tx, &record.id, end_of_day)?;
    state::finalize(&tx, &mut record, end_of_day)?;
    let totals = state::closing_totals(&record, end_of_day);
    attendance::set_check_out(&tx, &record.id, end_of_day, None, None, Some("auto checkout: end of day"), &totals)?;
    tx.commit()?;

    cache.remove(&record.user_id);
    info!(user_id = %record.user_id, %date, "closed record at end of day");
    Ok(true)
}

/// Pre-creates an empty attendance row for every active user; check-in
/// times stay unset until the user acts.
pub fn create_daily_records(db: &Db, date: NaiveDate) -> Result<usize> {
    let conn = db.conn();
    let active = users::list_active(&conn)?;

    let mut created = 0;
    for user in active {
        if attendance::create_empty(&conn, &user.id, date)? {
            created += 1;
        }
    }
    if created > 0 {
        info!(created, %date, "pre-created empty attendance rows");
    }
    Ok(created)
}
