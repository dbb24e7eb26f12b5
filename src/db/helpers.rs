//! Conversion helpers between SQLite text columns and chrono types.
//!
//! Timestamps are stored as UTC RFC 3339 text with millisecond precision;
//! dates as `YYYY-MM-DD`.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn format_opt_ts(ts: Option<DateTime<Utc>>) -> Option<String> {
    ts.map(format_ts)
}

pub fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid timestamp in {field}: {value}: {e}"))
}

pub fn parse_opt_ts(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(&v, field)).transpose()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| anyhow!("invalid date in {field}: {value}: {e}"))
}

pub fn parse_opt_json(value: Option<String>, field: &str) -> Result<Option<serde_json::Value>> {
    value
        .map(|v| serde_json::from_str(&v).map_err(|e| anyhow!("invalid json in {field}: {e}")))
        .transpose()
}

pub fn format_opt_json(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}
