//! # Strand Telemetry
//!
//! Per-operation correlation of logs, spans and metrics on top of
//! OpenTelemetry.
//!
//! ## Overview
//!
//! A [`Handle`] is created for one unit of work and passed down its call
//! chain. Everything logged through it shares the same trace and span ids:
//!
//! - **Structured Logging**: every log line carries `trace_id`, `span_id`,
//!   `job`, `service`, `level` and the fields accumulated on the handle
//! - **Distributed Tracing**: the handle's span starts lazily on first use and
//!   ends on the first log call, carrying the accumulated attributes
//! - **Metrics Collection**: a shared `log_total` counter and
//!   `log_duration_ms` histogram per service
//! - **Remote Logs and Error Reporting**: optional non-blocking log export to
//!   a Loki-compatible endpoint and error forwarding to Sentry
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strand_telemetry::{TelemetryConfig, create_telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = TelemetryConfig::default();
//!     config.service_name = "checkout".to_string();
//!     config.traces.enabled = true;
//!
//!     let instance = create_telemetry(&config)?;
//!
//!     let mut log = instance.telemetry().root("checkout");
//!     log.with_field("user_id", 42).with_field("cart_size", 3).info("start");
//!
//!     instance.shutdown();
//!     Ok(())
//! }
//! ```

pub mod attributes;
pub mod carrier;
pub mod config;
mod environment;
mod error;
pub mod exporter;
mod factory;
mod handle;
pub mod logs;
pub mod loki;
pub mod metrics;
pub mod metrics_registry;
pub mod panic;
pub mod reporter;
pub mod sink;
mod span;
pub mod telemetry;
pub mod traces;

#[cfg(test)]
mod testing;

pub use carrier::{SharedHandle, from_context, handle_from, share, with_handle};
pub use config::TelemetryConfig;
pub use environment::{Telemetry, TelemetryBuilder};
pub use error::{ExportError, PanicError, RecordedError, TelemetryError};
pub use factory::{TelemetryInstance, create_telemetry};
pub use handle::{Handle, Timer};
pub use sink::{Field, LogRecord, LogSink, MemorySink, Severity};
pub use span::SpanState;

pub use opentelemetry::{Context, KeyValue};
