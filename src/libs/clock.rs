//! Timezone-aware clock and identifier generation.
//!
//! All timestamps in the store are UTC; the attendance `date` and the
//! day boundaries (midnight, end-of-day) are derived in the server's
//! configured timezone. This module is the only place that converts
//! between the two.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use uuid::Uuid;

/// Wall clock bound to the configured server timezone.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(tz: Tz) -> Self {
        Clock { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// The current attendance date in the server timezone.
    pub fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    /// The attendance date a UTC instant falls on.
    pub fn date_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.tz).date_naive()
    }

    /// Local midnight at the start of `date`, as a UTC instant.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        self.local_to_utc(local)
    }

    /// 23:59:59.999 local at the end of `date`, as a UTC instant.
    pub fn end_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
        self.local_to_utc(local)
    }

    /// Next UTC instant at which the local wall clock reads `hour:minute`.
    pub fn next_occurrence(&self, hour: u32, minute: u32) -> DateTime<Utc> {
        let now_local = Utc::now().with_timezone(&self.tz);
        let target_time = chrono::NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
        let mut date = now_local.date_naive();
        if now_local.time() >= target_time {
            date += Duration::days(1);
        }
        self.local_to_utc(date.and_time(target_time))
    }

    fn local_to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            // DST fold: the earlier instant keeps day boundaries ordered.
            LocalResult::Ambiguous(first, _) => first.with_timezone(&Utc),
            // DST gap: the wall time does not exist; the next valid hour is
            // close enough for a day boundary.
            LocalResult::None => self
                .tz
                .from_local_datetime(&(local + Duration::hours(1)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&local)),
        }
    }
}

/// Generates a fresh record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
