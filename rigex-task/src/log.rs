//! Behavioral event log.
//!
//! The trial core emits `(timestamp, category, message)` records and never
//! waits on, or checks, their delivery.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Transition,
    Trial,
    Error,
    Timeout,
    Treadmill,
    Cue,
    Reward,
    Action,
    Sensor,
    Key,
    Session,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Transition => "transition",
            LogCategory::Trial => "trial",
            LogCategory::Error => "error",
            LogCategory::Timeout => "timeout",
            LogCategory::Treadmill => "treadmill",
            LogCategory::Cue => "cue",
            LogCategory::Reward => "reward",
            LogCategory::Action => "action",
            LogCategory::Sensor => "sensor",
            LogCategory::Key => "key",
            LogCategory::Session => "session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp_ns: u64,
    pub category: LogCategory,
    pub message: String,
}

impl LogRecord {
    pub fn new(timestamp_ns: u64, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp_ns,
            category,
            message: message.into(),
        }
    }
}

pub trait TrialLog: Send + Sync {
    fn record(&self, record: LogRecord);

    fn emit(&self, timestamp_ns: u64, category: LogCategory, message: &str) {
        self.record(LogRecord::new(timestamp_ns, category, message));
    }
}

/// Forwards records to `tracing` under the `rigex::trial` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl TrialLog for TracingLog {
    fn record(&self, r: LogRecord) {
        match r.category {
            LogCategory::Error | LogCategory::Timeout | LogCategory::Sensor => warn!(
                target: "rigex::trial",
                ts_ns = r.timestamp_ns,
                category = r.category.as_str(),
                "{}",
                r.message
            ),
            _ => info!(
                target: "rigex::trial",
                ts_ns = r.timestamp_ns,
                category = r.category.as_str(),
                "{}",
                r.message
            ),
        }
    }
}

/// Keeps every record in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Arc<Mutex<Vec<LogRecord>>>,
    echo: bool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also forward every record to [`TracingLog`].
    pub fn echoing() -> Self {
        Self {
            records: Arc::default(),
            echo: true,
        }
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self, category: LogCategory) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.category == category)
            .map(|r| r.message.clone())
            .collect()
    }

    pub fn count(&self, category: LogCategory, message: &str) -> usize {
        self.messages(category)
            .iter()
            .filter(|m| m.as_str() == message)
            .count()
    }

    /// One JSON object per line.
    pub fn to_json_lines(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        for r in self.records() {
            out.push_str(&serde_json::to_string(&r)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl TrialLog for MemoryLog {
    fn record(&self, record: LogRecord) {
        if self.echo {
            TracingLog.record(record.clone());
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_log_filters_by_category() {
        let log = MemoryLog::new();
        let shared = log.clone();
        shared.emit(1, LogCategory::Transition, "enter_standby");
        shared.emit(2, LogCategory::Error, "initiate_error");
        assert_eq!(log.messages(LogCategory::Error), vec!["initiate_error"]);
        assert_eq!(log.count(LogCategory::Transition, "enter_standby"), 1);
    }

    #[test]
    fn json_lines_round_trip_category_names() {
        let log = MemoryLog::new();
        log.emit(7, LogCategory::Reward, "reward_left;large;10");
        let text = log.to_json_lines().unwrap();
        assert!(text.contains("\"category\":\"reward\""));
        let back: LogRecord = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(back.timestamp_ns, 7);
    }
}
