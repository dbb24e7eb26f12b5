//! Configuration management for the vigil service.
//!
//! Settings are stored as JSON in the platform data directory and cover the
//! server timezone plus the tracker thresholds that drive heartbeat
//! classification and the reconcilers. Every threshold has a default that
//! matches the documented reconciliation behaviour, so a missing or partial
//! configuration file still yields a fully working service.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vigil::libs::config::Config;
//!
//! let config = Config::read()?;
//! let tracker = config.tracker.clone().unwrap_or_default();
//! # anyhow::Ok(())
//! ```

use crate::libs::data_storage::DataStorage;
use anyhow::Result;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};

/// Configuration file name inside the application data directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Thresholds driving heartbeat classification and the reconcilers.
///
/// All values are in seconds. The defaults reproduce the service's
/// documented behaviour: 5 minutes of silence turns WORKING into IDLE,
/// an hour of silence checks the user out, idle stretches are capped at
/// 30 minutes, lunch breaks at 2 hours.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TrackerConfig {
    /// Seconds without input before a WORKING record is considered idle.
    pub idle_after_secs: i64,

    /// Seconds without input before the record is checked out automatically.
    pub auto_checkout_after_secs: i64,

    /// Maximum contiguous idle stretch credited before auto-checkout.
    pub max_idle_secs: i64,

    /// Maximum lunch break duration before the break is capped and the
    /// record closed.
    pub max_lunch_secs: i64,

    /// How far before end-of-day the last input sample may lie before the
    /// unexplained tail of a WORKING record is re-billed as idle.
    pub eod_input_grace_secs: i64,

    /// Offset added to the last heartbeat when the gap detector checks a
    /// silent record out, so the trailing idle portion is accounted for.
    pub gap_checkout_offset_secs: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: 5 * 60,
            auto_checkout_after_secs: 60 * 60,
            max_idle_secs: 30 * 60,
            max_lunch_secs: 2 * 60 * 60,
            eod_input_grace_secs: 15 * 60,
            gap_checkout_offset_secs: 5 * 60,
        }
    }
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

/// Top-level service configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Server timezone; defines "today", end-of-day and the attendance date.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Tracker thresholds; absent sections fall back to defaults.
    pub tracker: Option<TrackerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            tracker: None,
        }
    }
}

impl Config {
    /// Reads the configuration file, falling back to defaults when absent.
    pub fn read() -> Result<Self> {
        let path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(&path)?;
        let config: Config = serde_json::from_reader(file)?;
        Ok(config)
    }

    /// Persists the configuration to the data directory.
    pub fn save(&self) -> Result<()> {
        let path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
