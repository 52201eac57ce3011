use lazy_static::lazy_static;
use opentelemetry::{
    InstrumentationScope, KeyValue, global,
    metrics::{Counter, Histogram, Meter},
};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};
use tracing::info;

use crate::sink::Severity;

// Counter and histogram shared by every handle of one service
#[derive(Clone)]
pub struct LogMetrics {
    // Note: meter field is kept even though it's not directly used
    // as it's needed to keep the meter provider alive
    #[allow(dead_code)]
    meter: Meter,
    pub log_total: Counter<u64>,
    pub log_duration_ms: Histogram<f64>,
}

impl LogMetrics {
    pub fn new(meter: Meter) -> Self {
        let log_total = meter
            .u64_counter("log_total")
            .with_description("Log calls by level")
            .build();

        let log_duration_ms = meter
            .f64_histogram("log_duration_ms")
            .with_description("Time from handle creation to log call, in milliseconds")
            .with_unit("ms")
            .build();

        LogMetrics {
            meter,
            log_total,
            log_duration_ms,
        }
    }

    /// Counts one log call and records the handle's elapsed time, both
    /// labelled by severity.
    pub fn record(&self, severity: Severity, duration_ms: f64) {
        let labels = [KeyValue::new("level", severity.as_str())];
        self.log_total.add(1, &labels);
        self.log_duration_ms.record(duration_ms, &labels);
    }
}

// One entry per service name, created on first use
lazy_static! {
    static ref METRICS: Mutex<HashMap<String, Arc<LogMetrics>>> = Mutex::new(HashMap::new());
}

/// Returns the metrics for `service_name`, creating them from the global
/// meter provider the first time the name is seen.
pub fn log_metrics(service_name: &str) -> Arc<LogMetrics> {
    let mut metrics = METRICS.lock();
    if let Some(existing) = metrics.get(service_name) {
        return existing.clone();
    }

    let scope = InstrumentationScope::builder(service_name.to_string()).build();
    let meter = global::meter_provider().meter_with_scope(scope);
    let created = Arc::new(LogMetrics::new(meter));
    metrics.insert(service_name.to_string(), created.clone());
    info!("Log metrics registry initialized for service {}", service_name);
    created
}
