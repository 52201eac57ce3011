use std::{net::SocketAddr, panic::AssertUnwindSafe, sync::Arc};

use axum::{
    Json, Router,
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    middleware::{Next, from_fn_with_state},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use opentelemetry::{
    KeyValue,
    trace::{SpanKind, TraceContextExt, Tracer},
};
use serde_json::json;
use strand_telemetry::{Context, Telemetry, panic::recover_panic_in, share, with_handle};
use tracing::debug;

use crate::extract::RequestContext;

/// State of the telemetry middleware: the environment handles are created
/// from and the name every request handle gets.
#[derive(Clone, Debug)]
pub struct TelemetryState {
    telemetry: Telemetry,
    name: Arc<str>,
}

impl TelemetryState {
    pub fn new(telemetry: Telemetry, name: impl Into<Arc<str>>) -> Self {
        Self {
            telemetry,
            name: name.into(),
        }
    }
}

/// Wraps every route of `router` in [`telemetry_middleware`].
pub fn instrument(router: Router, telemetry: Telemetry, name: &str) -> Router {
    router.layer(from_fn_with_state(
        TelemetryState::new(telemetry, name),
        telemetry_middleware,
    ))
}

/// The generic response sent when a handler panicked.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

/// Per-request telemetry.
///
/// Starts a server span named `"<METHOD> <route>"`, creates a correlation
/// handle with the `method`, `path`, `ip` and `ua` fields, and makes both
/// reachable through [`RequestContext`] and [`crate::RequestHandle`]. A
/// panicking handler is recovered here: the panic is logged once through the
/// handle, the server span is marked errored, and the client gets a `500`.
pub async fn telemetry_middleware(
    State(state): State<TelemetryState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| path.clone(), |p| p.as_str().to_string());
    let ip = client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());
    let ua = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let tracer = state.telemetry.tracer();
    let span = tracer
        .span_builder(format!("{method} {route}"))
        .with_kind(SpanKind::Server)
        .start_with_context(tracer, &Context::current());
    let request_cx = Context::current().with_span(span);

    let mut handle = state.telemetry.handle(request_cx.clone(), state.name.as_ref());
    handle
        .with_field("method", method)
        .with_field("path", path)
        .with_field("ip", ip)
        .with_field("ua", ua);
    let handle = share(handle);
    let cx = with_handle(&request_cx, handle.clone());
    request.extensions_mut().insert(RequestContext(cx.clone()));

    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let err = recover_panic_in(&cx, payload);
            debug!("Recovered request panic: {}", err);
            internal_error()
        }
    };

    handle.lock().end();

    let span = cx.span();
    span.set_attribute(KeyValue::new(
        "http.response.status_code",
        i64::from(response.status().as_u16()),
    ));
    span.end();

    response
}

fn client_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, connect_info) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(ConnectInfo(addr))) => addr.ip().to_string(),
        (None, None) => String::new(),
    }
}
