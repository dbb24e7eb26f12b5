//! Best-effort activity cache for the hot heartbeat path.
//!
//! Keyed by user id, the cache mirrors three things: the last observed
//! input/heartbeat timestamps, the current attendance state, and the last
//! committed attendance snapshot. Every entry expires after ~24 hours.
//!
//! The cache is advisory. Writes are fire-and-forget, readers must treat a
//! missing entry as "unknown" and fall back to the store, and every
//! correctness argument in the service holds with the cache empty. It exists
//! so the heartbeat processor and the gap detector do not have to scan
//! telemetry rows on every tick.

use crate::db::attendance::AttendanceRecord;
use crate::libs::state::WorkState;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Entry lifetime; long enough to span any workday.
const TTL_HOURS: i64 = 24;

/// Last observed agent activity for one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedActivity {
    /// When the user last produced real input (clicks or keystrokes).
    pub last_input: DateTime<Utc>,
    /// When the agent last reported in at all.
    pub last_heartbeat: DateTime<Utc>,
}

struct Entry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Entry {
            value,
            expires_at: Utc::now() + Duration::hours(TTL_HOURS),
        }
    }

    fn live(&self) -> Option<&T> {
        (Utc::now() < self.expires_at).then_some(&self.value)
    }
}

#[derive(Default)]
struct UserEntry {
    activity: Option<Entry<CachedActivity>>,
    state: Option<Entry<Option<WorkState>>>,
    snapshot: Option<Entry<AttendanceRecord>>,
}

/// Process-wide advisory cache, cheap to clone and share.
#[derive(Clone, Default)]
pub struct ActivityCache {
    inner: Arc<Mutex<HashMap<String, UserEntry>>>,
}

impl ActivityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activity(&self, user_id: &str) -> Option<CachedActivity> {
        let map = self.inner.lock();
        map.get(user_id)?.activity.as_ref()?.live().copied()
    }

    pub fn set_activity(&self, user_id: &str, activity: CachedActivity) {
        let mut map = self.inner.lock();
        map.entry(user_id.to_string()).or_default().activity = Some(Entry::new(activity));
    }

    /// Informational mirror of the record's current state.
    pub fn state(&self, user_id: &str) -> Option<Option<WorkState>> {
        let map = self.inner.lock();
        map.get(user_id)?.state.as_ref()?.live().copied()
    }

    pub fn set_state(&self, user_id: &str, state: Option<WorkState>) {
        let mut map = self.inner.lock();
        map.entry(user_id.to_string()).or_default().state = Some(Entry::new(state));
    }

    /// Last committed attendance snapshot for fast status reads.
    pub fn snapshot(&self, user_id: &str) -> Option<AttendanceRecord> {
        let map = self.inner.lock();
        map.get(user_id)?.snapshot.as_ref()?.live().cloned()
    }

    pub fn set_snapshot(&self, user_id: &str, record: &AttendanceRecord) {
        let mut map = self.inner.lock();
        map.entry(user_id.to_string()).or_default().snapshot = Some(Entry::new(record.clone()));
    }

    /// Drops every entry for the user; called on check-out.
    pub fn remove(&self, user_id: &str) {
        self.inner.lock().remove(user_id);
    }
}
