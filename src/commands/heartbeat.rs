//! Heartbeat ingestion.
//!
//! One call per agent sample, one store transaction. The processor
//! classifies the sample against the cached last-input timestamp, back-dates
//! an IDLE start when the agent was silent too long, moves the record toward
//! the desired state, and records the raw sample for metrics.
//!
//! The authoritative input signal is `mouse_clicks + keyboard_strokes > 0`;
//! a heartbeat without clicks or keystrokes keeps the agent "alive" but does
//! not count as input. That distinction is what separates idle from gap.
//!
//! An agent that was silent past the auto-checkout threshold gets no state
//! update here: the transaction is abandoned and a sentinel is returned so
//! the outer layer can run the check-out command in its own transaction.

use crate::db::{activity_log, attendance, input_samples};
use crate::db::input_samples::InputSample;
use crate::libs::cache::{ActivityCache, CachedActivity};
use crate::libs::clock::Clock;
use crate::libs::config::TrackerConfig;
use crate::libs::error::{ApiError, ApiResult};
use crate::libs::state::{self, WorkState};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, TransactionBehavior};
use tracing::debug;

/// What the processor decided for one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The sample was ingested; the record is in `state`.
    Accepted { state: WorkState },
    /// The agent was silent too long; the caller must run check-out for the
    /// user at `at` in a fresh transaction. Nothing was persisted.
    AutoCheckout { at: DateTime<Utc> },
}

pub fn cmd(
    conn: &mut Connection,
    cache: &ActivityCache,
    clock: &Clock,
    tracker: &TrackerConfig,
    user_id: &str,
    sample: InputSample,
    now: DateTime<Utc>,
) -> ApiResult<HeartbeatOutcome> {
    let date = clock.date_of(now);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut record = match attendance::fetch_by_user_date(&tx, user_id, date)? {
        None => return Err(ApiError::NotCheckedIn),
        Some(record) if record.check_in_time.is_none() => return Err(ApiError::NotCheckedIn),
        Some(record) if record.check_out_time.is_some() => return Err(ApiError::AlreadyCheckedOut),
        Some(record) => record,
    };

    // A missing cache entry means "unknown", which must never bill time:
    // treat the last input as right now.
    let prev_input = cache.activity(user_id).map(|a| a.last_input).unwrap_or(now);
    let gap = (now - prev_input).num_seconds();

    if gap > tracker.auto_checkout_after_secs {
        // The transaction rolls back on drop; check-out owns its own.
        drop(tx);
        debug!(user_id, gap_seconds = gap, "agent silent past auto-checkout threshold");
        return Ok(HeartbeatOutcome::AutoCheckout { at: now });
    }

    let has_input = sample.has_input();

    // Back-date the idle start to the last observed input so the WORKING
    // counter does not grow over a stretch the agent was silent.
    if gap > tracker.idle_after_secs && record.current_state == Some(WorkState::Working)
        && state::apply_transition(&tx, &mut record, WorkState::Idle, prev_input)?
    {
        activity_log::close_open(&tx, &record.id, prev_input)?;
        activity_log::open_segment(&tx, &record.id, activity_log::SegmentKind::Idle, prev_input)?;
    }

    // The server's notion of last input: the client's idle estimate wins
    // when present, then input in this sample, then the cached value.
    let last_input = if sample.idle_time_seconds > 0 {
        now - Duration::seconds(sample.idle_time_seconds)
    } else if has_input {
        now
    } else {
        prev_input
    };

    let desired = if has_input || (now - last_input).num_seconds() < tracker.idle_after_secs {
        WorkState::Working
    } else {
        WorkState::Idle
    };

    // LUNCH is only left by an explicit end-break command.
    if record.current_state != Some(WorkState::Lunch) && record.current_state != Some(desired) {
        let transition_at = match record.last_state_change_at {
            Some(since) => last_input.max(since),
            None => last_input,
        };
        if state::apply_transition(&tx, &mut record, desired, transition_at)? {
            activity_log::close_open(&tx, &record.id, transition_at)?;
            activity_log::open_segment(&tx, &record.id, desired.into(), transition_at)?;
        }
    }

    input_samples::insert(&tx, &record.id, now, &sample)?;
    tx.commit()?;

    cache.set_activity(
        user_id,
        CachedActivity {
            last_input,
            last_heartbeat: now,
        },
    );
    cache.set_state(user_id, record.current_state);
    cache.set_snapshot(user_id, &record);

    Ok(HeartbeatOutcome::Accepted {
        state: record.current_state.unwrap_or(desired),
    })
}
