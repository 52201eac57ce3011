use std::{collections::BTreeMap, error::Error as StdError, sync::Arc};

use opentelemetry::{global::BoxedTracer, trace::TracerProvider as _};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    config::TelemetryConfig,
    environment::Telemetry,
    exporter::{LogExporter, LogQueue},
    reporter::ErrorReporter,
    sink::MemorySink,
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Captured {
    pub message: String,
    pub causes: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub extras: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    captured: Mutex<Vec<Captured>>,
}

impl RecordingReporter {
    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn capture(
        &self,
        err: &(dyn StdError + 'static),
        tags: &BTreeMap<String, String>,
        extras: &BTreeMap<String, Value>,
    ) {
        let mut causes = Vec::new();
        let mut next = err.source();
        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }
        self.captured.lock().push(Captured {
            message: err.to_string(),
            causes,
            tags: tags.clone(),
            extras: extras.clone(),
        });
    }
}

/// A telemetry environment wired to in-memory collectors.
pub(crate) struct Harness {
    pub telemetry: Telemetry,
    pub sink: MemorySink,
    pub spans: InMemorySpanExporter,
    pub reporter: Arc<RecordingReporter>,
    pub exporter: LogExporter,
    pub queue: LogQueue,
    _provider: SdkTracerProvider,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: TelemetryConfig) -> Self {
        let spans = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(spans.clone())
            .build();
        let tracer = BoxedTracer::new(Box::new(provider.tracer("strand-tests")));
        let sink = MemorySink::new();
        let reporter = Arc::new(RecordingReporter::default());
        let (exporter, queue) = LogExporter::bounded(config.remote_logs.queue_capacity);

        let telemetry = Telemetry::builder(config)
            .tracer(tracer)
            .without_metrics()
            .sink(Arc::new(sink.clone()))
            .exporter(exporter.clone())
            .reporter(reporter.clone())
            .build();

        Self {
            telemetry,
            sink,
            spans,
            reporter,
            exporter,
            queue,
            _provider: provider,
        }
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.spans.get_finished_spans().unwrap_or_default()
    }
}

pub(crate) fn test_config() -> TelemetryConfig {
    TelemetryConfig {
        service_name: "shop".to_string(),
        job_name: "shop-api".to_string(),
        ..Default::default()
    }
}
