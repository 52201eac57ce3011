use std::{fmt, sync::Arc};

use opentelemetry::{
    Context, InstrumentationScope,
    global::{self, BoxedTracer},
    trace::{TracerProvider as _, noop::NoopTracer},
};

use crate::{
    config::TelemetryConfig,
    exporter::LogExporter,
    handle::Handle,
    metrics_registry::{LogMetrics, log_metrics},
    reporter::ErrorReporter,
    sink::{LogSink, NoopSink, TracingSink},
};

/// Everything a handle needs besides its own per-operation state.
///
/// One `Telemetry` is built at start-up from an immutable
/// [`TelemetryConfig`] and cloned into whatever creates handles. Clones share
/// the same tracer, metrics, sink, exporter and reporter.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

struct Inner {
    config: TelemetryConfig,
    tracer: BoxedTracer,
    metrics: Option<Arc<LogMetrics>>,
    sink: Arc<dyn LogSink>,
    exporter: Option<LogExporter>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.inner.config.service_name)
            .field("job_name", &self.inner.config.job_name)
            .field("metrics", &self.inner.metrics.is_some())
            .field("exporter", &self.inner.exporter.is_some())
            .field("reporter", &self.inner.reporter.is_some())
            .finish()
    }
}

impl Telemetry {
    pub fn builder(config: TelemetryConfig) -> TelemetryBuilder {
        TelemetryBuilder::new(config)
    }

    /// An environment that starts no real spans, records no metrics, and
    /// discards log lines.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(Inner {
                config: TelemetryConfig::default(),
                tracer: BoxedTracer::new(Box::new(NoopTracer::new())),
                metrics: None,
                sink: Arc::new(NoopSink),
                exporter: None,
                reporter: None,
            }),
        }
    }

    /// Creates a handle for one logical operation. No span is started until
    /// the handle is first used.
    pub fn handle(&self, cx: Context, name: impl Into<String>) -> Handle {
        Handle::new(self.clone(), cx, name.into())
    }

    /// Creates a handle parented on the currently attached context.
    pub fn root(&self, name: impl Into<String>) -> Handle {
        self.handle(Context::current(), name)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn service_name(&self) -> &str {
        &self.inner.config.service_name
    }

    pub fn job_name(&self) -> &str {
        &self.inner.config.job_name
    }

    pub fn exporter(&self) -> Option<&LogExporter> {
        self.inner.exporter.as_ref()
    }

    pub fn tracer(&self) -> &BoxedTracer {
        &self.inner.tracer
    }

    pub(crate) fn metrics(&self) -> Option<&LogMetrics> {
        self.inner.metrics.as_deref()
    }

    pub(crate) fn sink(&self) -> &dyn LogSink {
        self.inner.sink.as_ref()
    }

    /// The exporter, but only while remote log export is switched on.
    pub(crate) fn active_exporter(&self) -> Option<&LogExporter> {
        if self.inner.config.remote_logs.enabled {
            self.inner.exporter.as_ref()
        } else {
            None
        }
    }

    /// The reporter, but only while error reporting is switched on.
    pub(crate) fn active_reporter(&self) -> Option<&dyn ErrorReporter> {
        if self.inner.config.error_reporting.enabled {
            self.inner.reporter.as_deref()
        } else {
            None
        }
    }
}

pub struct TelemetryBuilder {
    config: TelemetryConfig,
    tracer: Option<BoxedTracer>,
    metrics: Option<Option<Arc<LogMetrics>>>,
    sink: Arc<dyn LogSink>,
    exporter: Option<LogExporter>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl TelemetryBuilder {
    fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            tracer: None,
            metrics: None,
            sink: Arc::new(TracingSink),
            exporter: None,
            reporter: None,
        }
    }

    /// Defaults to the global tracer provider's tracer for the service name.
    pub fn tracer(mut self, tracer: BoxedTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Defaults to the shared per-service metrics from the registry.
    pub fn metrics(mut self, metrics: Arc<LogMetrics>) -> Self {
        self.metrics = Some(Some(metrics));
        self
    }

    pub fn without_metrics(mut self) -> Self {
        self.metrics = Some(None);
        self
    }

    /// Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn exporter(mut self, exporter: LogExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> Telemetry {
        let service_name = self.config.service_name.clone();
        let tracer = self.tracer.unwrap_or_else(|| {
            let scope = InstrumentationScope::builder(service_name.clone()).build();
            global::tracer_provider().tracer_with_scope(scope)
        });
        let metrics = self.metrics.unwrap_or_else(|| Some(log_metrics(&service_name)));

        Telemetry {
            inner: Arc::new(Inner {
                config: self.config,
                tracer,
                metrics,
                sink: self.sink,
                exporter: self.exporter,
                reporter: self.reporter,
            }),
        }
    }
}
