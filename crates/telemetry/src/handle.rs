//! The per-operation correlation handle.
//!
//! A [`Handle`] is created for one logical unit of work (an HTTP request, a
//! background job, a manual call) and threaded through its call chain. It
//! accumulates log fields and span attributes, starts its span lazily on
//! first use, and stamps every log line with the span's trace and span ids.
//!
//! Every log call runs the same protocol:
//!
//! 1. start the span if the handle has none yet;
//! 2. read the trace/span ids (empty strings when there is no valid span);
//! 3. emit the structured line through the sink: `trace_id`, `span_id`,
//!    `job`, `service`, `level`, then the accumulated fields in insertion
//!    order;
//! 4. queue a [`LogEntry`] for remote export when that is enabled, without
//!    ever waiting on the network;
//! 5. flush the sorted attributes plus `log.message`, `log.level` and
//!    `duration_ms` onto the span, mark it errored if an error was recorded,
//!    end it, and update the shared counter and histogram.
//!
//! A handle owns at most one span. Later log calls reuse the ended span's ids
//! and leave the span untouched.
//!
//! Handles are not meant to be mutated from several tasks at once. Fork a
//! [`Handle::child`] for concurrent sub-work, or share one behind
//! [`crate::SharedHandle`].

use std::{
    collections::BTreeMap,
    error::Error as StdError,
    fmt,
    future::Future,
    time::Instant,
};

use opentelemetry::{
    Context, KeyValue,
    trace::{TraceContextExt, Tracer},
};
use serde_json::Value;

use crate::{
    attributes::AttributeSet,
    environment::Telemetry,
    error::RecordedError,
    exporter::LogEntry,
    sink::{Field, Severity, render_value},
    span::{SpanController, SpanState},
};

pub struct Handle {
    telemetry: Telemetry,
    name: String,
    span: SpanController,
    fields: Vec<Field>,
    attributes: AttributeSet,
    last_error: Option<RecordedError>,
    start: Instant,
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("span_state", &self.span.state())
            .field("fields", &self.fields)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl Handle {
    pub(crate) fn new(telemetry: Telemetry, cx: Context, name: String) -> Self {
        Self {
            telemetry,
            name,
            span: SpanController::new(cx),
            fields: Vec::new(),
            attributes: AttributeSet::new(),
            last_error: None,
            start: Instant::now(),
        }
    }

    /// A handle on [`Telemetry::noop`]: safe to use anywhere, records nothing.
    pub fn noop(name: impl Into<String>) -> Self {
        Telemetry::noop().handle(Context::new(), name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Changes the name the span will get when it starts. Has no effect on
    /// a span that already started.
    pub fn rename(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// The handle's context; carries the handle's span once it started.
    pub fn context(&self) -> &Context {
        self.span.context()
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    pub fn span_state(&self) -> SpanState {
        self.span.state()
    }

    pub fn trace_id(&self) -> String {
        self.span.ids().0
    }

    pub fn span_id(&self) -> String {
        self.span.ids().1
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn last_error(&self) -> Option<&RecordedError> {
        self.last_error.as_ref()
    }

    /// Appends a log field and the matching span attribute. Empty keys are
    /// ignored.
    pub fn with_field(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if key.is_empty() {
            return self;
        }
        let value = value.into();
        self.attributes.push(key.clone(), render_value(&value));
        self.fields.push(Field { key, value });
        self
    }

    /// Applies [`Handle::with_field`] to every pair. Output order of the
    /// span attributes does not depend on the iteration order.
    pub fn with_fields<I, K, V>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (key, value) in fields {
            self.with_field(key, value);
        }
        self
    }

    /// Records `err` as the handle's error (replacing any earlier one), adds
    /// an `error` field, and forwards it to the error reporter when error
    /// reporting is enabled. The span is marked errored when it ends.
    pub fn with_error<E>(&mut self, err: &E) -> &mut Self
    where
        E: StdError + ?Sized,
    {
        let recorded = RecordedError::new(err);
        let message = recorded.message().to_string();
        self.fields.push(Field::new("error", message.clone()));
        self.attributes.push("error", message.clone());

        if let Some(reporter) = self.telemetry.active_reporter() {
            let tags = self.attributes.to_map();
            let mut extras = BTreeMap::new();
            extras.insert("error".to_string(), Value::from(message));
            reporter.capture(&recorded, &tags, &extras);
        }

        self.last_error = Some(recorded);
        self
    }

    /// [`Handle::with_error`] for the `Err` case; `Ok` leaves the handle
    /// untouched.
    pub fn with_result<T, E>(&mut self, result: &Result<T, E>) -> &mut Self
    where
        E: StdError,
    {
        if let Err(err) = result {
            self.with_error(err);
        }
        self
    }

    pub fn debug(&mut self, message: &str) {
        self.log(Severity::Debug, message);
    }

    pub fn info(&mut self, message: &str) {
        self.log(Severity::Info, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.log(Severity::Warn, message);
    }

    pub fn error(&mut self, message: &str) {
        self.log(Severity::Error, message);
    }

    /// Logs at fatal severity, ends the span, and **terminates the process**
    /// with exit code 1.
    ///
    /// This is not an error path: nothing is returned and destructors of the
    /// caller do not run. Only call it when the process must stop now.
    pub fn fatal(&mut self, message: &str) -> ! {
        self.log(Severity::Fatal, message);
        self.span.end();
        std::process::exit(1)
    }

    fn log(&mut self, severity: Severity, message: &str) {
        self.span.ensure_started(self.telemetry.tracer(), &self.name);
        let (trace_id, span_id) = self.span.ids();

        let mut fields = Vec::with_capacity(self.fields.len() + 5);
        fields.push(Field::new("trace_id", trace_id));
        fields.push(Field::new("span_id", span_id));
        fields.push(Field::new("job", self.telemetry.job_name()));
        fields.push(Field::new("service", self.telemetry.service_name()));
        fields.push(Field::new("level", severity.as_str()));
        fields.extend(self.fields.iter().cloned());

        self.telemetry.sink().emit(severity, message, &fields);

        if let Some(exporter) = self.telemetry.active_exporter() {
            let labels = fields
                .iter()
                .map(|f| (f.key.clone(), f.value_string()))
                .collect();
            exporter.enqueue(LogEntry::new(labels, message));
        }

        let duration_ms = self.elapsed_ms();
        let attributes = self.attributes.flush(message, severity.as_str(), duration_ms);
        let error = self.last_error.as_ref().map(|e| e as &dyn StdError);
        self.span.finish(attributes, error);

        if let Some(metrics) = self.telemetry.metrics() {
            metrics.record(severity, duration_ms);
        }
    }

    /// Ends the span without logging: flushes the accumulated attributes
    /// and `duration_ms`, and marks it errored if an error was recorded.
    /// No-op when the span never started or already ended.
    pub fn end(&mut self) {
        let attributes = self.attributes.flush_duration(self.elapsed_ms());
        let error = self.last_error.as_ref().map(|e| e as &dyn StdError);
        self.span.finish(attributes, error);
    }

    /// Forks a handle for a sub-operation.
    ///
    /// The child's span starts immediately as a child of this handle's
    /// context, so it shares the trace of whatever span that context
    /// carries. Fields, attributes, error and start time are fresh; the
    /// telemetry environment is shared.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        let mut span = SpanController::new(self.span.context().clone());
        span.ensure_started(self.telemetry.tracer(), &name);
        Self {
            telemetry: self.telemetry.clone(),
            name,
            span,
            fields: Vec::new(),
            attributes: AttributeSet::new(),
            last_error: None,
            start: Instant::now(),
        }
    }

    /// Runs `f` inside a short-lived span derived from this handle's
    /// context. The span ends when `f` returns, whatever it returns, and
    /// also when `f` unwinds.
    pub fn with_span<T>(&self, name: impl Into<String>, f: impl FnOnce(&Context) -> T) -> T {
        let guard = self.scoped_span(name.into());
        f(&guard.0)
    }

    /// Async form of [`Handle::with_span`]. The span ends once the future
    /// completes or is dropped.
    pub async fn with_span_async<F, Fut, T>(&self, name: impl Into<String>, f: F) -> T
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.scoped_span(name.into());
        f(guard.0.clone()).await
    }

    fn scoped_span(&self, name: String) -> ScopedSpan {
        let parent = self.span.context();
        let span = self.telemetry.tracer().start_with_context(name, parent);
        ScopedSpan(parent.with_span(span))
    }

    /// Adds an event to the handle's span, starting the span if needed.
    /// Ignored once the span ended.
    pub fn span_event(&mut self, name: impl Into<String>, attributes: Vec<KeyValue>) {
        self.span.ensure_started(self.telemetry.tracer(), &self.name);
        self.span.add_event(name.into(), attributes);
    }

    /// Sets one attribute on the handle's span right away, starting the span
    /// if needed. Ignored once the span ended.
    pub fn set_span_attr(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.span.ensure_started(self.telemetry.tracer(), &self.name);
        let value = render_value(&value.into());
        self.span.set_attribute(KeyValue::new(key.into(), value));
    }

    /// Records `err` on the handle's span without touching the handle's own
    /// error state. Ignored once the span ended.
    pub fn set_span_error<E>(&mut self, err: &E)
    where
        E: StdError + ?Sized,
    {
        self.span.ensure_started(self.telemetry.tracer(), &self.name);
        self.span.record_error(&RecordedError::new(err));
    }

    pub fn start_timer(&self, name: impl Into<String>) -> Timer {
        Timer {
            name: name.into(),
            start: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

struct ScopedSpan(Context);

impl Drop for ScopedSpan {
    fn drop(&mut self) {
        self.0.span().end();
    }
}

/// Measures a stretch of work and reports it as one span event.
///
/// A timer that is never stopped reports nothing.
#[derive(Debug, Clone)]
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Adds an event named after the timer, with a `custom.duration_ms`
    /// attribute, to `handle`'s span.
    pub fn stop(self, handle: &mut Handle) {
        let duration_ms = self.elapsed_ms();
        handle.span_event(self.name, vec![KeyValue::new("custom.duration_ms", duration_ms)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, test_config};
    use opentelemetry::{Value as OtelValue, trace::Status};
    use serde_json::json;
    use std::{collections::HashMap, panic::AssertUnwindSafe};

    fn attr_keys(span: &opentelemetry_sdk::trace::SpanData) -> Vec<String> {
        span.attributes.iter().map(|kv| kv.key.as_str().to_string()).collect()
    }

    fn attr<'a>(span: &'a opentelemetry_sdk::trace::SpanData, key: &str) -> Option<&'a OtelValue> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    #[derive(Debug, thiserror::Error)]
    #[error("card declined")]
    struct Declined;

    #[test]
    fn test_create_does_not_start_span() {
        let harness = Harness::new();
        let handle = harness.telemetry.handle(Context::new(), "idle");
        assert_eq!(handle.span_state(), SpanState::NoSpan);
        assert_eq!(handle.trace_id(), "");
        drop(handle);
        assert!(harness.finished_spans().is_empty());
    }

    #[test]
    fn test_checkout_scenario() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "checkout");
        h.with_field("user_id", 42).with_field("cart_size", 3).info("start");

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.name, "checkout");
        assert_eq!(
            attr_keys(span),
            vec!["cart_size", "duration_ms", "log.level", "log.message", "user_id"]
        );
        assert_eq!(attr(span, "cart_size"), Some(&OtelValue::from("3")));
        assert_eq!(attr(span, "log.level"), Some(&OtelValue::from("info")));
        assert_eq!(attr(span, "log.message"), Some(&OtelValue::from("start")));
        assert_eq!(attr(span, "user_id"), Some(&OtelValue::from("42")));
        assert!(matches!(attr(span, "duration_ms"), Some(OtelValue::F64(_))));

        let records = harness.sink.records();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.severity, Severity::Info);
        assert_eq!(record.message, "start");
        assert_eq!(
            record.keys(),
            vec!["trace_id", "span_id", "job", "service", "level", "user_id", "cart_size"]
        );
        assert_eq!(
            record.field("trace_id"),
            Some(&json!(span.span_context.trace_id().to_string()))
        );
        assert_eq!(
            record.field("span_id"),
            Some(&json!(span.span_context.span_id().to_string()))
        );
        assert_eq!(record.field("job"), Some(&json!("shop-api")));
        assert_eq!(record.field("service"), Some(&json!("shop")));
        assert_eq!(record.field("level"), Some(&json!("info")));
        assert_eq!(record.field("user_id"), Some(&json!(42)));
    }

    #[test]
    fn test_at_most_one_span() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "batch");
        h.info("one");
        h.warn("two");
        h.debug("three");

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(attr(&spans[0], "log.message"), Some(&OtelValue::from("one")));
        assert_eq!(h.span_state(), SpanState::Ended);

        let records = harness.sink.records();
        assert_eq!(records.len(), 3);
        let span_ids: Vec<_> = records.iter().map(|r| r.field("span_id").cloned()).collect();
        assert!(span_ids.iter().all(|id| id == &span_ids[0]));
        assert_eq!(records[2].field("level"), Some(&json!("debug")));
    }

    #[test]
    fn test_log_without_fields_has_identifiers() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "bare");
        h.error("boom");

        let record = &harness.sink.records()[0];
        assert_eq!(record.keys(), vec!["trace_id", "span_id", "job", "service", "level"]);
        assert_eq!(record.field("level"), Some(&json!("error")));
        assert_eq!(record.field("trace_id").map(|v| v.as_str().map(str::len)), Some(Some(32)));
    }

    #[test]
    fn test_log_fields_do_not_include_span_decorations() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_field("k", "v").info("msg");

        let record = &harness.sink.records()[0];
        assert!(record.field("duration_ms").is_none());
        assert!(record.field("log.message").is_none());
    }

    #[test]
    fn test_empty_key_is_ignored() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_field("", 1);
        assert!(h.fields().is_empty());
        assert!(h.attributes().is_empty());
    }

    #[test]
    fn test_with_fields_flush_is_sorted() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        let mut fields = HashMap::new();
        fields.insert("zone", json!("b"));
        fields.insert("attempt", json!(2));
        fields.insert("dry_run", json!(false));
        h.with_fields(fields).with_field("attempt", 3).info("done");

        let spans = harness.finished_spans();
        assert_eq!(
            attr_keys(&spans[0]),
            vec!["attempt", "dry_run", "duration_ms", "log.level", "log.message", "zone"]
        );
        assert_eq!(attr(&spans[0], "attempt"), Some(&OtelValue::from("3")));
        assert_eq!(attr(&spans[0], "dry_run"), Some(&OtelValue::from("false")));
        // fields keep duplicates
        assert_eq!(h.fields().len(), 4);
    }

    #[test]
    fn test_ok_result_is_noop() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_field("a", 1);
        let ok: Result<(), Declined> = Ok(());
        h.with_result(&ok);

        assert!(h.last_error().is_none());
        assert_eq!(h.fields().len(), 1);
        assert_eq!(h.attributes().len(), 1);
    }

    #[test]
    fn test_error_marks_span_and_is_logged() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "pay");
        let result: Result<(), Declined> = Err(Declined);
        h.with_result(&result).warn("payment failed");

        assert_eq!(h.last_error().map(RecordedError::message), Some("card declined"));
        let spans = harness.finished_spans();
        assert_eq!(spans[0].status, Status::error("card declined"));
        assert_eq!(attr(&spans[0], "error"), Some(&OtelValue::from("card declined")));
        assert_eq!(harness.sink.records()[0].field("error"), Some(&json!("card declined")));
    }

    #[test]
    fn test_last_error_is_overwritten() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_error(&std::io::Error::other("first"));
        h.with_error(&Declined);
        h.info("x");

        assert_eq!(h.last_error().map(RecordedError::message), Some("card declined"));
        assert_eq!(harness.finished_spans()[0].status, Status::error("card declined"));
    }

    #[test]
    fn test_reporter_disabled_by_default() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_error(&Declined);
        assert!(harness.reporter.captured().is_empty());
    }

    #[test]
    fn test_reporter_receives_tags_and_extras() {
        let mut config = test_config();
        config.error_reporting.enabled = true;
        let harness = Harness::with_config(config);
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_field("user_id", 42).with_error(&Declined);

        let captured = harness.reporter.captured();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].message, "card declined");
        assert_eq!(captured[0].tags.get("user_id").map(String::as_str), Some("42"));
        assert_eq!(captured[0].tags.get("error").map(String::as_str), Some("card declined"));
        assert_eq!(captured[0].extras.get("error"), Some(&json!("card declined")));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("payment failed")]
    struct PaymentFailed(#[source] std::io::Error);

    #[test]
    fn test_reporter_sees_error_causes() {
        let mut config = test_config();
        config.error_reporting.enabled = true;
        let harness = Harness::with_config(config);
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_error(&PaymentFailed(std::io::Error::other("gateway timeout")));

        let captured = harness.reporter.captured();
        assert_eq!(captured[0].message, "payment failed");
        assert_eq!(captured[0].causes, vec!["gateway timeout".to_string()]);

        let recorded = h.last_error().unwrap();
        assert_eq!(recorded.source().map(|e| e.to_string()), Some("gateway timeout".to_string()));
    }

    fn level_of(attributes: &[KeyValue]) -> String {
        attributes
            .iter()
            .find(|kv| kv.key.as_str() == "level")
            .map(|kv| kv.value.as_str().into_owned())
            .unwrap_or_default()
    }

    fn find_metric<'a>(
        metrics: &'a opentelemetry_sdk::metrics::data::ResourceMetrics,
        name: &str,
    ) -> &'a opentelemetry_sdk::metrics::data::Metric {
        metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .find(|m| m.name == name)
            .unwrap()
    }

    #[test]
    fn test_log_updates_level_metrics() {
        use crate::{metrics_registry::LogMetrics, sink::MemorySink};
        use opentelemetry::metrics::MeterProvider as _;
        use opentelemetry_sdk::metrics::{
            InMemoryMetricExporter, PeriodicReader, SdkMeterProvider,
            data::{Histogram, Sum},
        };
        use std::sync::Arc;

        let exporter = InMemoryMetricExporter::default();
        let provider = SdkMeterProvider::builder()
            .with_reader(PeriodicReader::builder(exporter.clone()).build())
            .build();
        let telemetry = Telemetry::builder(test_config())
            .metrics(Arc::new(LogMetrics::new(provider.meter("handle-tests"))))
            .sink(Arc::new(MemorySink::new()))
            .build();

        let mut first = telemetry.handle(Context::new(), "first");
        first.info("one");
        first.info("two");
        telemetry.handle(Context::new(), "second").error("three");

        provider.force_flush().unwrap();
        let exported = exporter.get_finished_metrics().unwrap();
        let latest = exported.last().unwrap();

        let totals: BTreeMap<String, u64> = find_metric(latest, "log_total")
            .data
            .as_any()
            .downcast_ref::<Sum<u64>>()
            .unwrap()
            .data_points
            .iter()
            .map(|p| (level_of(&p.attributes), p.value))
            .collect();
        assert_eq!(totals.get("info"), Some(&2));
        assert_eq!(totals.get("error"), Some(&1));
        assert_eq!(totals.len(), 2);

        let counts: BTreeMap<String, u64> = find_metric(latest, "log_duration_ms")
            .data
            .as_any()
            .downcast_ref::<Histogram<f64>>()
            .unwrap()
            .data_points
            .iter()
            .map(|p| (level_of(&p.attributes), p.count))
            .collect();
        assert_eq!(counts.get("info"), Some(&2));
        assert_eq!(counts.get("error"), Some(&1));
    }

    // Re-runs this test in a child process, which is the one that calls `fatal`.
    #[test]
    fn test_fatal_logs_then_exits_with_code_one() {
        const CHILD_ENV: &str = "STRAND_FATAL_CHILD";
        if std::env::var_os(CHILD_ENV).is_some() {
            tracing_subscriber::fmt()
                .with_writer(std::io::stdout)
                .with_ansi(false)
                .init();
            let telemetry = Telemetry::builder(test_config()).without_metrics().build();
            telemetry
                .handle(Context::new(), "shutdown")
                .with_field("reason", "disk full")
                .fatal("cannot continue");
        }

        let output = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "handle::tests::test_fatal_logs_then_exits_with_code_one",
                "--nocapture",
            ])
            .env(CHILD_ENV, "1")
            .output()
            .unwrap();

        assert_eq!(output.status.code(), Some(1));
        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| line.contains("cannot continue"))
            .unwrap();
        assert!(line.contains("ERROR"));
        assert!(line.contains("level=fatal"));
        assert!(line.contains("service=shop"));
    }

    #[test]
    fn test_export_disabled_never_enqueues() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        for i in 0..10 {
            h.with_field("i", i).info("tick");
        }
        assert_eq!(harness.exporter.pending(), 0);
        assert_eq!(harness.exporter.stats().enqueued(), 0);
    }

    #[test]
    fn test_export_enabled_enqueues_labels() {
        let mut config = test_config();
        config.remote_logs.enabled = true;
        let mut harness = Harness::with_config(config);
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.with_field("user_id", 42).info("start");
        h.info("again");

        assert_eq!(harness.exporter.pending(), 2);
        let entry = harness.queue.try_recv().unwrap();
        assert_eq!(entry.message, "start");
        assert_eq!(entry.labels.get("user_id").map(String::as_str), Some("42"));
        assert_eq!(entry.labels.get("service").map(String::as_str), Some("shop"));
        assert_eq!(entry.labels.get("level").map(String::as_str), Some("info"));
        assert_eq!(entry.labels.get("trace_id"), Some(&h.trace_id()));
    }

    #[test]
    fn test_child_shares_trace_with_fresh_state() {
        let harness = Harness::new();
        let mut parent = harness.telemetry.handle(Context::new(), "checkout");
        parent.with_field("user_id", 42).info("start");

        let mut child = parent.child("payment");
        assert_eq!(child.span_state(), SpanState::Active);
        assert!(child.fields().is_empty());
        assert!(child.attributes().is_empty());
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());

        child.error("declined");

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 2);
        let parent_span = &spans[0];
        let child_span = &spans[1];
        assert_eq!(child_span.name, "payment");
        assert_eq!(child_span.parent_span_id, parent_span.span_context.span_id());
        // logging at error severity alone does not mark the span errored
        assert_eq!(child_span.status, Status::Unset);
        assert_eq!(attr(parent_span, "log.message"), Some(&OtelValue::from("start")));
    }

    #[test]
    fn test_child_with_error_marks_only_child() {
        let harness = Harness::new();
        let mut parent = harness.telemetry.handle(Context::new(), "checkout");
        parent.span_event("begin", vec![]);

        let mut child = parent.child("payment");
        child.with_error(&Declined).error("declined");
        parent.info("done");

        let spans = harness.finished_spans();
        let child_span = spans.iter().find(|s| s.name == "payment").unwrap();
        let parent_span = spans.iter().find(|s| s.name == "checkout").unwrap();
        assert_eq!(child_span.status, Status::error("card declined"));
        assert_eq!(parent_span.status, Status::Unset);
    }

    #[test]
    fn test_end_flushes_duration_without_logging() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "job");
        h.with_field("rows", 10).set_span_attr("phase", "load");
        h.end();
        h.end();

        assert!(harness.sink.is_empty());
        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(attr_keys(&spans[0]), vec!["phase", "duration_ms", "rows"]);
    }

    #[test]
    fn test_end_before_start_is_noop() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "job");
        h.end();
        assert_eq!(h.span_state(), SpanState::NoSpan);
        assert!(harness.finished_spans().is_empty());
    }

    #[test]
    fn test_span_mutations_after_end_are_ignored() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.info("done");

        h.span_event("late", vec![]);
        h.set_span_attr("late", true);
        h.set_span_error(&Declined);
        h.end();

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 1);
        assert!(attr(&spans[0], "late").is_none());
        assert_eq!(spans[0].events.events.len(), 0);
    }

    #[test]
    fn test_rename_before_start() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "unnamed");
        h.rename("GET /orders").info("ok");
        h.rename("ignored");
        assert_eq!(harness.finished_spans()[0].name, "GET /orders");
    }

    #[test]
    fn test_timer_records_event() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        let timer = h.start_timer("db.query");
        let _forgotten = h.start_timer("never.stopped");
        timer.stop(&mut h);
        h.info("done");

        let spans = harness.finished_spans();
        let events = &spans[0].events.events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "db.query");
        assert_eq!(events[0].attributes[0].key.as_str(), "custom.duration_ms");
    }

    #[test]
    fn test_with_span_ends_on_return() {
        let harness = Harness::new();
        let mut h = harness.telemetry.handle(Context::new(), "op");
        h.span_event("begin", vec![]);

        let result: Result<u32, Declined> = h.with_span("lookup", |cx| {
            assert!(cx.span().span_context().is_valid());
            Err(Declined)
        });
        assert!(result.is_err());

        let spans = harness.finished_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "lookup");
        assert_eq!(spans[0].span_context.trace_id().to_string(), h.trace_id());
        assert_eq!(h.span_state(), SpanState::Active);
    }

    #[test]
    fn test_with_span_ends_on_unwind() {
        let harness = Harness::new();
        let h = harness.telemetry.handle(Context::new(), "op");
        let caught = std::panic::catch_unwind(AssertUnwindSafe(|| {
            h.with_span("explodes", |_| -> () { panic!("boom") })
        }));
        assert!(caught.is_err());
        assert_eq!(harness.finished_spans()[0].name, "explodes");
    }

    #[tokio::test]
    async fn test_with_span_async() {
        let harness = Harness::new();
        let h = harness.telemetry.handle(Context::new(), "op");
        let value = h
            .with_span_async("fetch", |cx| async move {
                tokio::task::yield_now().await;
                cx.span().span_context().is_valid()
            })
            .await;
        assert!(value);
        assert_eq!(harness.finished_spans()[0].name, "fetch");
    }

    #[test]
    fn test_noop_handle_is_safe() {
        let mut h = Handle::noop("nothing");
        h.with_field("a", 1).with_error(&Declined);
        h.info("x");
        h.span_event("e", vec![]);
        let mut child = h.child("sub");
        child.warn("y");
        assert_eq!(h.trace_id(), "");
        assert_eq!(h.span_id(), "");
        assert_eq!(child.trace_id(), "");
    }
}
