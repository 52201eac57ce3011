use std::collections::BTreeMap;

use opentelemetry::KeyValue;

/// Insertion-ordered key/value bag of span attributes.
///
/// Values are kept in their rendered string form. Duplicate keys are allowed
/// while accumulating; [`AttributeSet::sorted`] resolves them (last write
/// wins) and orders the result by key so the flushed set is deterministic
/// regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSet {
    entries: Vec<(String, String)>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Deduplicated view keyed by attribute name.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    pub fn sorted(&self) -> Vec<(String, String)> {
        self.to_map().into_iter().collect()
    }

    /// Attributes ready for a span after a log call: sorted, deduplicated,
    /// with the synthesized `log.message`, `log.level` and `duration_ms`
    /// entries taking precedence over anything accumulated under the same
    /// keys.
    pub fn flush(&self, message: &str, level: &str, duration_ms: f64) -> Vec<KeyValue> {
        self.merge(Some((message, level)), duration_ms)
    }

    /// Like [`AttributeSet::flush`] for a span ended without a log call.
    pub fn flush_duration(&self, duration_ms: f64) -> Vec<KeyValue> {
        self.merge(None, duration_ms)
    }

    fn merge(&self, log: Option<(&str, &str)>, duration_ms: f64) -> Vec<KeyValue> {
        let mut merged: BTreeMap<String, FlushValue> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), FlushValue::Text(v.clone())))
            .collect();
        if let Some((message, level)) = log {
            merged.insert("log.message".to_string(), FlushValue::Text(message.to_string()));
            merged.insert("log.level".to_string(), FlushValue::Text(level.to_string()));
        }
        merged.insert("duration_ms".to_string(), FlushValue::Float(duration_ms));

        merged
            .into_iter()
            .map(|(key, value)| match value {
                FlushValue::Text(v) => KeyValue::new(key, v),
                FlushValue::Float(v) => KeyValue::new(key, v),
            })
            .collect()
    }
}

enum FlushValue {
    Text(String),
    Float(f64),
}
