use chrono::{DateTime, Local};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::timestamp::{display_or_original, normalize};
use crate::util::{mean, round_to, std_dev};

/// Number of sessions kept on disk.
pub const HISTORY_LIMIT: usize = 20;

/// Counts above this are clamped; it is the largest integer a JSON reader can
/// hold exactly as a double.
pub const MAX_COUNT: u64 = 1 << 53;

/// Metrics submitted by the client when a practice run finishes.
///
/// Missing or `null` fields count as zero; negatives are clamped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SessionMetrics {
    #[serde(default, deserialize_with = "non_negative_number")]
    pub wpm: f64,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub errors: u64,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub backspaces: u64,
}

/// One completed typing attempt, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default, deserialize_with = "non_negative_number")]
    pub wpm: f64,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub errors: u64,
    #[serde(default, deserialize_with = "non_negative_count")]
    pub backspaces: u64,
    #[serde(default, deserialize_with = "loose_string")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub sessions: usize,
    pub average_wpm: f64,
    pub best_wpm: f64,
    pub wpm_std_dev: f64,
    pub total_errors: u64,
    pub total_backspaces: u64,
}

/// Stamps `metrics` with `now`, keeping full sub-second precision.
pub fn record_session(metrics: &SessionMetrics, now: DateTime<Local>) -> SessionRecord {
    let timestamp = now
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string();
    let display_timestamp = Some(display_or_original(&timestamp));

    SessionRecord {
        wpm: metrics.wpm,
        errors: metrics.errors,
        backspaces: metrics.backspaces,
        timestamp,
        display_timestamp,
    }
}

/// Puts `record` first and drops everything past [`HISTORY_LIMIT`].
pub fn append_and_trim(mut history: Vec<SessionRecord>, record: SessionRecord) -> Vec<SessionRecord> {
    history.insert(0, record);
    history.truncate(HISTORY_LIMIT);
    history
}

pub fn clear() -> Vec<SessionRecord> {
    Vec::new()
}

/// Read path used before rendering.
///
/// Entries written before `display_timestamp` existed get one derived from
/// `timestamp`, then the list is re-sorted newest first by the raw timestamp
/// string. Never truncates.
pub fn prepare_for_display(mut history: Vec<SessionRecord>) -> Vec<SessionRecord> {
    for record in history.iter_mut().filter(|r| r.display_timestamp.is_none()) {
        let display = if record.timestamp.contains('T') {
            display_or_original(&record.timestamp)
        } else {
            record.timestamp.clone()
        };
        record.display_timestamp = Some(display);
    }

    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    history
}

pub fn summarize(history: &[SessionRecord]) -> HistorySummary {
    let wpms: Vec<f64> = history.iter().map(|r| r.wpm).collect();

    HistorySummary {
        sessions: history.len(),
        average_wpm: mean(&wpms).map_or(0.0, |m| round_to(m, 1)),
        best_wpm: wpms.iter().copied().fold(0.0, f64::max),
        wpm_std_dev: std_dev(&wpms).map_or(0.0, |sd| round_to(sd, 1)),
        total_errors: history.iter().fold(0u64, |sum, r| sum.saturating_add(r.errors)),
        total_backspaces: history
            .iter()
            .fold(0u64, |sum, r| sum.saturating_add(r.backspaces)),
    }
}

impl SessionRecord {
    /// Whether `timestamp` parses at all; used to flag odd legacy rows in logs.
    pub fn has_valid_timestamp(&self) -> bool {
        normalize(&self.timestamp).is_ok()
    }
}

fn number_from(value: &Value) -> Result<f64, String> {
    match value {
        Value::Null => Ok(0.0),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        other => Err(format!("expected a number, got {other}")),
    }
}

fn non_negative_number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let value = Value::deserialize(d)?;
    let n = number_from(&value).map_err(de::Error::custom)?;
    Ok(if n.is_finite() { n.max(0.0) } else { 0.0 })
}

fn non_negative_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    non_negative_number(d).map(|n| n.floor().min(MAX_COUNT as f64) as u64)
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}
