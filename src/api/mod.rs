//! Public operation surface of the attendance core.
//!
//! [`AttendanceApi`] is the thin layer a transport (HTTP handlers, RPC,
//! tests) and a scheduler call into. Commands and reconcilers all funnel
//! through the same state engine, so every entry point speaks the same
//! transition language. Each operation optionally takes an explicit
//! timestamp; when omitted it runs at the clock's current time.

use crate::commands::breaks::{self, BreakRequest};
use crate::commands::check_in::{self, CheckInRequest};
use crate::commands::check_out::{self, CheckOutRequest};
use crate::commands::heartbeat::{self, HeartbeatOutcome};
use crate::commands::status::{self, TodayAttendance};
use crate::db::attendance::AttendanceRecord;
use crate::db::db::Db;
use crate::db::input_samples::InputSample;
use crate::db::lunch_breaks::LunchBreak;
use crate::db::users::{self, User};
use crate::libs::cache::ActivityCache;
use crate::libs::clock::Clock;
use crate::libs::config::{Config, TrackerConfig};
use crate::libs::error::{ApiError, ApiResult};
use crate::libs::reconciler;
use crate::libs::state::WorkState;
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

/// Acknowledgement for an accepted heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub current_state: WorkState,
}

/// The attendance service facade.
#[derive(Clone)]
pub struct AttendanceApi {
    db: Db,
    cache: ActivityCache,
    clock: Clock,
    tracker: TrackerConfig,
}

impl AttendanceApi {
    /// Opens the store in the platform data directory.
    pub fn new(config: Config) -> Result<Self> {
        let db = Db::new()?;
        Ok(Self::with_db(config, db))
    }

    /// Builds the service on an already opened store.
    pub fn with_db(config: Config, db: Db) -> Self {
        Self {
            db,
            cache: ActivityCache::new(),
            clock: Clock::new(config.timezone),
            tracker: config.tracker.unwrap_or_default(),
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn cache(&self) -> &ActivityCache {
        &self.cache
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Registers or updates a user identity.
    pub fn upsert_user(&self, user: &User) -> ApiResult<()> {
        let conn = self.db.conn();
        users::upsert(&conn, user)?;
        Ok(())
    }

    pub fn check_in(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
        ip: Option<String>,
        location: Option<serde_json::Value>,
    ) -> ApiResult<AttendanceRecord> {
        let req = CheckInRequest {
            user_id: user_id.to_string(),
            at: at.unwrap_or_else(|| self.clock.now()),
            ip,
            location,
        };
        let mut conn = self.db.conn();
        check_in::cmd(&mut conn, &self.cache, &self.clock, req)
    }

    pub fn check_out(
        &self,
        user_id: &str,
        at: Option<DateTime<Utc>>,
        ip: Option<String>,
        location: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> ApiResult<AttendanceRecord> {
        let req = CheckOutRequest {
            user_id: user_id.to_string(),
            at: at.unwrap_or_else(|| self.clock.now()),
            ip,
            location,
            reason,
        };
        let mut conn = self.db.conn();
        check_out::cmd(&mut conn, &self.cache, &self.clock, req)
    }

    pub fn heartbeat(&self, user_id: &str, sample: InputSample) -> ApiResult<HeartbeatAck> {
        self.heartbeat_at(user_id, sample, self.clock.now())
    }

    /// Ingests one heartbeat observed at `now`.
    ///
    /// When the processor reports the agent dead, its transaction has been
    /// abandoned; the check-out command then runs in a fresh one and the
    /// caller sees `AUTO_CHECKED_OUT`.
    pub fn heartbeat_at(&self, user_id: &str, sample: InputSample, now: DateTime<Utc>) -> ApiResult<HeartbeatAck> {
        let outcome = {
            let mut conn = self.db.conn();
            heartbeat::cmd(&mut conn, &self.cache, &self.clock, &self.tracker, user_id, sample, now)?
        };
        match outcome {
            HeartbeatOutcome::Accepted { state } => Ok(HeartbeatAck { current_state: state }),
            HeartbeatOutcome::AutoCheckout { at } => {
                info!(user_id, "auto check-out triggered from heartbeat processing");
                let req = CheckOutRequest {
                    user_id: user_id.to_string(),
                    at,
                    ip: None,
                    location: None,
                    reason: Some("auto checkout: agent silent past the threshold".to_string()),
                };
                let mut conn = self.db.conn();
                match check_out::cmd(&mut conn, &self.cache, &self.clock, req) {
                    Ok(_) => Err(ApiError::AutoCheckedOut),
                    // A parallel closer beat us to it; the net effect stands.
                    Err(e) if e.is_domain_rejection() => Err(ApiError::AutoCheckedOut),
                    Err(e) => Err(e),
                }
            }
        }
    }

    pub fn start_break(&self, user_id: &str, at: Option<DateTime<Utc>>, location: Option<serde_json::Value>) -> ApiResult<LunchBreak> {
        let req = BreakRequest {
            user_id: user_id.to_string(),
            at: at.unwrap_or_else(|| self.clock.now()),
            location,
        };
        let mut conn = self.db.conn();
        breaks::start(&mut conn, &self.cache, &self.clock, req)
    }

    pub fn end_break(&self, user_id: &str, at: Option<DateTime<Utc>>, location: Option<serde_json::Value>) -> ApiResult<LunchBreak> {
        let req = BreakRequest {
            user_id: user_id.to_string(),
            at: at.unwrap_or_else(|| self.clock.now()),
            location,
        };
        let mut conn = self.db.conn();
        breaks::end(&mut conn, &self.cache, &self.clock, req)
    }

    pub fn today_attendance(&self, user_id: &str) -> ApiResult<Option<TodayAttendance>> {
        self.today_attendance_at(user_id, self.clock.now())
    }

    pub fn today_attendance_at(&self, user_id: &str, now: DateTime<Utc>) -> ApiResult<Option<TodayAttendance>> {
        let conn = self.db.conn();
        status::today(&conn, &self.cache, &self.clock, user_id, now)
    }

    pub fn attendance_history(&self, user_id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ApiResult<Vec<AttendanceRecord>> {
        self.attendance_history_asof(user_id, start, end, self.clock.today())
    }

    pub fn attendance_history_asof(
        &self,
        user_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> ApiResult<Vec<AttendanceRecord>> {
        let conn = self.db.conn();
        status::history(&conn, &self.clock, user_id, start, end, today)
    }

    // Scheduled job entry points. The scheduler (or a test) calls these;
    // each runs its batch as of the given instant.

    pub fn run_excessive_break_closer(&self) -> Result<usize> {
        self.run_excessive_break_closer_at(self.clock.now())
    }

    pub fn run_excessive_break_closer_at(&self, now: DateTime<Utc>) -> Result<usize> {
        reconciler::close_excessive_breaks(&self.db, &self.cache, &self.tracker, now)
    }

    pub fn run_excessive_idle_closer(&self) -> Result<usize> {
        self.run_excessive_idle_closer_at(self.clock.now())
    }

    pub fn run_excessive_idle_closer_at(&self, now: DateTime<Utc>) -> Result<usize> {
        reconciler::close_excessive_idle(&self.db, &self.cache, &self.tracker, now)
    }

    pub fn run_gap_detector(&self) -> Result<usize> {
        self.run_gap_detector_at(self.clock.now())
    }

    pub fn run_gap_detector_at(&self, now: DateTime<Utc>) -> Result<usize> {
        reconciler::detect_gaps(&self.db, &self.cache, &self.clock, &self.tracker, now)
    }

    pub fn run_end_of_day_closer(&self) -> Result<usize> {
        self.run_end_of_day_closer_for(self.clock.today())
    }

    pub fn run_end_of_day_closer_for(&self, date: NaiveDate) -> Result<usize> {
        reconciler::close_day(&self.db, &self.cache, &self.clock, &self.tracker, date)
    }

    pub fn run_daily_attendance_creator(&self) -> Result<usize> {
        self.run_daily_attendance_creator_for(self.clock.today())
    }

    pub fn run_daily_attendance_creator_for(&self, date: NaiveDate) -> Result<usize> {
        reconciler::create_daily_records(&self.db, date)
    }

    /// Closes records left open on previous days; run at process start.
    pub fn startup_backfill(&self) -> Result<usize> {
        self.startup_backfill_for(self.clock.today())
    }

    pub fn startup_backfill_for(&self, today: NaiveDate) -> Result<usize> {
        reconciler::backfill(&self.db, &self.cache, &self.clock, &self.tracker, today)
    }
}
