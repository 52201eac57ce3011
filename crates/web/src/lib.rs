//! # Strand Web
//!
//! axum integration for `strand-telemetry`: a per-request middleware that
//! opens a server span and a correlation handle, and a panic boundary that
//! turns a panicking handler into a logged error and a `500` response.
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use strand_telemetry::Telemetry;
//! use strand_web::{RequestHandle, instrument};
//!
//! async fn checkout(RequestHandle(log): RequestHandle) -> &'static str {
//!     log.lock().with_field("cart_size", 3).info("checkout started");
//!     "ok"
//! }
//!
//! let app = instrument(Router::new().route("/checkout", get(checkout)), Telemetry::noop(), "api");
//! ```

mod extract;
mod middleware;

pub use extract::{RequestContext, RequestHandle};
pub use middleware::{TelemetryState, instrument, internal_error, telemetry_middleware};
