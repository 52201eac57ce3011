use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::SdkTracerProvider};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    config::TelemetryConfig,
    environment::Telemetry,
    error::TelemetryError,
    exporter::LogExporter,
    logs::setup_log_subscriber,
    loki::LokiTransport,
    reporter::SentryReporter,
    telemetry::{build_resource, init_telemetry, shutdown_telemetry},
};

/// A running telemetry system.
///
/// Owns the OpenTelemetry providers, the error-reporting client and the
/// remote-log worker. Create it once at start-up, hand out
/// [`TelemetryInstance::telemetry`] to whatever creates handles, and call
/// [`TelemetryInstance::shutdown`] before the process exits so buffered data
/// is flushed.
pub struct TelemetryInstance {
    telemetry: Telemetry,

    /// None when traces are disabled.
    tracer_provider: Option<SdkTracerProvider>,

    /// None when metrics are disabled.
    meter_provider: Option<SdkMeterProvider>,

    sentry_guard: Option<sentry::ClientInitGuard>,

    exporter_worker: Option<JoinHandle<()>>,
}

impl TelemetryInstance {
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Flushes and shuts down every provider. Entries still waiting in the
    /// remote-log queue are abandoned. Blocks briefly while data is exported.
    pub fn shutdown(self) {
        if let Some(worker) = self.exporter_worker {
            if let Some(exporter) = self.telemetry.exporter() {
                info!(
                    "Stopping remote log export: pending={}, sent={}, dropped={}, failed={}",
                    exporter.pending(),
                    exporter.stats().sent(),
                    exporter.stats().dropped(),
                    exporter.stats().failed()
                );
            }
            worker.abort();
        }

        shutdown_telemetry(self.tracer_provider, self.meter_provider);

        // dropping the guard flushes queued error reports
        drop(self.sentry_guard);
    }
}

/// Creates the telemetry system described by `config`.
///
/// Installs the log subscriber, builds the OTLP providers for the enabled
/// signals and registers them globally, starts error reporting and the
/// remote-log worker when enabled. Remote log export needs a running Tokio
/// runtime.
pub fn create_telemetry(config: &TelemetryConfig) -> Result<TelemetryInstance, TelemetryError> {
    config.validate()?;

    setup_log_subscriber(&config.logging);

    let resource = build_resource(config.service_name.clone(), &config.global_labels);

    let (tracer_provider, meter_provider) = init_telemetry(config, resource)?;

    if let Some(ref provider) = tracer_provider {
        global::set_tracer_provider(provider.clone());
    } else {
        warn!("No tracer provider available, spans will not be exported");
    }

    // Set before the builder resolves the metrics registry entry for this service
    if let Some(ref provider) = meter_provider {
        global::set_meter_provider(provider.clone());
    } else {
        warn!("No meter provider available, metrics will not be recorded");
    }

    let mut builder = Telemetry::builder(config.clone());

    let sentry_guard = if config.error_reporting.enabled {
        let guard = SentryReporter::init(&config.service_name, &config.error_reporting);
        if !guard.is_enabled() {
            warn!("Error reporting client is disabled, check the configured DSN");
        }
        builder = builder.reporter(Arc::new(SentryReporter::from_config(&config.error_reporting)));
        Some(guard)
    } else {
        None
    };

    let exporter_worker = if config.remote_logs.enabled {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TelemetryError::InitializationError(
                "remote log export requires a running Tokio runtime".to_string(),
            ));
        }
        let transport = Arc::new(LokiTransport::new(&config.remote_logs)?);
        let (exporter, worker) = LogExporter::spawn(transport, config.remote_logs.queue_capacity);
        info!("Remote log export enabled with endpoint: {}", config.remote_logs.endpoint);
        builder = builder.exporter(exporter);
        Some(worker)
    } else {
        None
    };

    Ok(TelemetryInstance {
        telemetry: builder.build(),
        tracer_provider,
        meter_provider,
        sentry_guard,
        exporter_worker,
    })
}
