//! Structured log sinks.
//!
//! A handle renders every log call into a [`LogRecord`]: the message, a
//! [`Severity`], and an ordered list of [`Field`]s (synthesized identifiers
//! first, then the fields accumulated on the handle in insertion order). The
//! sink decides how that record reaches the outside world.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key/value pair destined for a structured log line. The value keeps its
/// native JSON type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn value_string(&self) -> String {
        render_value(&self.value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value_string())
    }
}

/// Strings render without quotes, everything else in its JSON form.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
    pub fields: Vec<Field>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.key == key).map(|f| &f.value)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.key.as_str()).collect()
    }
}

pub trait LogSink: Send + Sync {
    fn emit(&self, severity: Severity, message: &str, fields: &[Field]);
}

/// Keys the handle stamps on every record, in emission order.
const IDENTIFIERS: [&str; 5] = ["trace_id", "span_id", "job", "service", "level"];

/// Splits a record into its identifier values (empty when missing) and the
/// remaining fields as one JSON object. Only the first occurrence of an
/// identifier key counts as the identifier; later ones stay with the rest.
fn split_identifiers(fields: &[Field]) -> ([String; 5], Value) {
    let mut ids: [Option<String>; 5] = Default::default();
    let mut rest = Map::new();
    for field in fields {
        match IDENTIFIERS.iter().position(|key| *key == field.key) {
            Some(i) if ids[i].is_none() => ids[i] = Some(field.value_string()),
            _ => {
                rest.insert(field.key.clone(), field.value.clone());
            }
        }
    }
    (ids.map(Option::unwrap_or_default), Value::Object(rest))
}

/// Forwards records to the `tracing` dispatcher.
///
/// The identifiers become event fields of their own (`trace_id`, `span_id`,
/// `job`, `service`, `level`) so a JSON subscriber writes them as keys. The
/// accumulated fields travel together as a JSON object in `fields`.
///
/// `tracing` has no fatal level, so fatal records go out at `ERROR` with
/// `level=fatal`. The sink never exits the process itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, severity: Severity, message: &str, fields: &[Field]) {
        let ([trace_id, span_id, job, service, level], rest) = split_identifiers(fields);

        macro_rules! emit_at {
            ($lvl:expr) => {
                tracing::event!(
                    target: "strand",
                    $lvl,
                    trace_id = %trace_id,
                    span_id = %span_id,
                    job = %job,
                    service = %service,
                    level = %level,
                    fields = %rest,
                    "{message}"
                )
            };
        }

        match severity {
            Severity::Debug => emit_at!(tracing::Level::DEBUG),
            Severity::Info => emit_at!(tracing::Level::INFO),
            Severity::Warn => emit_at!(tracing::Level::WARN),
            Severity::Error | Severity::Fatal => emit_at!(tracing::Level::ERROR),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, severity: Severity, message: &str, fields: &[Field]) {
        self.records.lock().push(LogRecord {
            severity,
            message: message.to_string(),
            fields: fields.to_vec(),
        });
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn emit(&self, _severity: Severity, _message: &str, _fields: &[Field]) {}
}
