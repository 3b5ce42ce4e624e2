//! Logger facade (C11), its default `tracing`-backed init (C12), and a
//! test-capture sink (C13).
//!
//! The facade is an explicit value constructed once and handed to every
//! component that logs, rather than a process-wide singleton the core
//! reaches for ambiently. The default sink simply forwards to `tracing`;
//! tests construct a [`Logger`] around [`CaptureSink`] instead.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Log severity levels used throughout the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single structured log record.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: Value,
}

/// A sink capable of recording a log record. Must never panic.
pub trait LogSink: Send + Sync {
    fn record(&self, record: Record);
}

/// Default sink: forwards every record to the process-wide `tracing`
/// subscriber installed by [`init_logging`] (or to nowhere, harmlessly, if
/// none was installed).
pub struct TracingSink;

impl LogSink for TracingSink {
    fn record(&self, record: Record) {
        match record.level {
            Level::Debug => tracing::debug!(fields = %record.fields, "{}", record.message),
            Level::Info => tracing::info!(fields = %record.fields, "{}", record.message),
            Level::Warning => tracing::warn!(fields = %record.fields, "{}", record.message),
            Level::Error => tracing::error!(fields = %record.fields, "{}", record.message),
        }
    }
}

/// In-memory sink used by tests to assert on what was logged without
/// scraping stdout or relying on a global subscriber.
#[derive(Default)]
pub struct CaptureSink {
    records: Mutex<Vec<Record>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every record captured so far.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().expect("capture sink lock poisoned").clone()
    }

    /// Whether any record at or above `level` mentions `needle` in its message.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|r| r.level == level && r.message.contains(needle))
    }
}

impl Clone for Record {
    fn clone(&self) -> Self {
        Self {
            level: self.level,
            message: self.message.clone(),
            fields: self.fields.clone(),
        }
    }
}

impl LogSink for CaptureSink {
    fn record(&self, record: Record) {
        self.records
            .lock()
            .expect("capture sink lock poisoned")
            .push(record);
    }
}

/// The logger facade every component receives. Cheaply cloneable.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Build a logger around the default `tracing`-backed sink.
    pub fn new() -> Self {
        Self {
            sink: Arc::new(TracingSink),
        }
    }

    /// Build a logger around an arbitrary sink (e.g. [`CaptureSink`] in tests).
    pub fn with_sink(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn debug(&self, message: impl Into<String>, fields: Value) {
        self.sink.record(Record {
            level: Level::Debug,
            message: message.into(),
            fields,
        });
    }

    pub fn info(&self, message: impl Into<String>, fields: Value) {
        self.sink.record(Record {
            level: Level::Info,
            message: message.into(),
            fields,
        });
    }

    pub fn warning(&self, message: impl Into<String>, fields: Value) {
        self.sink.record(Record {
            level: Level::Warning,
            message: message.into(),
            fields,
        });
    }

    pub fn error(&self, message: impl Into<String>, fields: Value) {
        self.sink.record(Record {
            level: Level::Error,
            message: message.into(),
            fields,
        });
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot, idempotent installation of the process-wide `tracing`
/// subscriber: JSON layer for `log_format == "json"`, pretty ANSI otherwise.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::info!(log_level = %log_level, log_format = %log_format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capture_sink_records_messages() {
        let sink = Arc::new(CaptureSink::new());
        let logger = Logger::with_sink(sink.clone());

        logger.error("handler failed", json!({"message_id": "1-0"}));
        logger.debug("published", json!({"topic": "t"}));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, Level::Error);
        assert!(sink.contains(Level::Error, "handler failed"));
        assert!(!sink.contains(Level::Error, "published"));
    }

    #[test]
    fn level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warning);
        assert!(Level::Warning < Level::Error);
    }
}
