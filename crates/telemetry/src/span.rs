use std::error::Error as StdError;

use opentelemetry::{
    Context, KeyValue,
    global::BoxedTracer,
    trace::{Status, TraceContextExt, Tracer},
};

/// Lifecycle of the one span a handle may own.
///
/// `NoSpan -> Active` happens on first use, `Active -> Ended` exactly once.
/// There is no way back: a handle never owns a second span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    NoSpan,
    Active,
    Ended,
}

#[derive(Debug)]
pub(crate) struct SpanController {
    state: SpanState,
    cx: Context,
}

impl SpanController {
    pub(crate) const fn new(cx: Context) -> Self {
        Self {
            state: SpanState::NoSpan,
            cx,
        }
    }

    pub(crate) const fn state(&self) -> SpanState {
        self.state
    }

    pub(crate) const fn context(&self) -> &Context {
        &self.cx
    }

    /// Starts the span as a child of whatever the current context carries.
    /// No-op unless the state is `NoSpan`.
    pub(crate) fn ensure_started(&mut self, tracer: &BoxedTracer, name: &str) {
        if self.state != SpanState::NoSpan {
            return;
        }
        let span = tracer.start_with_context(name.to_string(), &self.cx);
        self.cx = self.cx.with_span(span);
        self.state = SpanState::Active;
    }

    /// Hex trace and span ids of the span in context, or empty strings when
    /// the context carries no valid span.
    pub(crate) fn ids(&self) -> (String, String) {
        let span = self.cx.span();
        let sc = span.span_context();
        if sc.is_valid() {
            (sc.trace_id().to_string(), sc.span_id().to_string())
        } else {
            (String::new(), String::new())
        }
    }

    pub(crate) fn set_attribute(&self, attribute: KeyValue) {
        if self.state == SpanState::Active {
            self.cx.span().set_attribute(attribute);
        }
    }

    pub(crate) fn add_event(&self, name: String, attributes: Vec<KeyValue>) {
        if self.state == SpanState::Active {
            self.cx.span().add_event(name, attributes);
        }
    }

    pub(crate) fn record_error(&self, err: &dyn StdError) {
        if self.state == SpanState::Active {
            self.cx.span().record_error(err);
        }
    }

    /// Flushes attributes, marks the span errored when `error` is set, and
    /// ends it. Only the first call after activation has any effect.
    pub(crate) fn finish(&mut self, attributes: Vec<KeyValue>, error: Option<&dyn StdError>) {
        if self.state != SpanState::Active {
            return;
        }
        let span = self.cx.span();
        span.set_attributes(attributes);
        if let Some(err) = error {
            span.set_status(Status::error(err.to_string()));
            span.record_error(err);
        }
        span.end();
        self.state = SpanState::Ended;
    }

    pub(crate) fn end(&mut self) {
        if self.state == SpanState::Active {
            self.cx.span().end();
            self.state = SpanState::Ended;
        }
    }
}
