//! Job scheduling for the reconcilers.
//!
//! Interval loops for the high-frequency jobs (gap detector every minute,
//! the two cap closers every five) and sleep-until-local-time loops for the
//! daily jobs (end-of-day closer at 23:59, attendance creator at midnight).
//! The loops only call the API's job entry points; all reconciliation
//! semantics live in [`crate::libs::reconciler`].

use crate::api::AttendanceApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

pub const GAP_DETECTOR_INTERVAL: Duration = Duration::from_secs(60);
pub const CLOSER_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const END_OF_DAY_HOUR: u32 = 23;
pub const END_OF_DAY_MINUTE: u32 = 59;

pub struct Scheduler {
    api: Arc<AttendanceApi>,
}

impl Scheduler {
    pub fn new(api: Arc<AttendanceApi>) -> Self {
        Scheduler { api }
    }

    /// Spawns every job loop; the returned handles run until aborted.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_gap_detector(),
            self.spawn_cap_closers(),
            self.spawn_end_of_day_closer(),
            self.spawn_daily_creator(),
        ]
    }

    fn spawn_gap_detector(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(GAP_DETECTOR_INTERVAL);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match api.run_gap_detector() {
                    Ok(touched) if touched > 0 => debug!(touched, "gap detector pass complete"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "gap detector pass failed"),
                }
            }
        })
    }

    fn spawn_cap_closers(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(CLOSER_INTERVAL);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = api.run_excessive_break_closer() {
                    warn!(error = %e, "excessive-break closer pass failed");
                }
                if let Err(e) = api.run_excessive_idle_closer() {
                    warn!(error = %e, "excessive-idle closer pass failed");
                }
            }
        })
    }

    fn spawn_end_of_day_closer(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            loop {
                let at = api.clock().next_occurrence(END_OF_DAY_HOUR, END_OF_DAY_MINUTE);
                sleep_until(&api, at).await;
                let date = api.clock().date_of(at);
                match api.run_end_of_day_closer_for(date) {
                    Ok(closed) => debug!(closed, %date, "end-of-day closer pass complete"),
                    Err(e) => warn!(error = %e, "end-of-day closer pass failed"),
                }
            }
        })
    }

    fn spawn_daily_creator(&self) -> JoinHandle<()> {
        let api = self.api.clone();
        tokio::spawn(async move {
            loop {
                let at = api.clock().next_occurrence(0, 0);
                sleep_until(&api, at).await;
                let date = api.clock().date_of(at);
                match api.run_daily_attendance_creator_for(date) {
                    Ok(created) => debug!(created, %date, "daily attendance creator pass complete"),
                    Err(e) => warn!(error = %e, "daily attendance creator pass failed"),
                }
            }
        })
    }
}

async fn sleep_until(api: &AttendanceApi, at: chrono::DateTime<chrono::Utc>) {
    let wait = (at - api.clock().now()).num_milliseconds().max(0) as u64;
    time::sleep(Duration::from_millis(wait)).await;
}
