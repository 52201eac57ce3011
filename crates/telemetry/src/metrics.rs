use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider};
use tracing::{error, info};

use crate::{
    config::{CollectorConfig, signal_endpoint},
    error::TelemetryError,
    telemetry::{EXPORT_TIMEOUT, auth_headers},
};

pub fn init_metrics(
    collector: &CollectorConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, TelemetryError> {
    let endpoint_url = signal_endpoint(&collector.endpoint, "v1/metrics");
    info!("Initializing metrics with endpoint: {}", endpoint_url);

    let mut builder = MetricExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(&endpoint_url)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(headers) = auth_headers(&collector.auth) {
        builder = builder.with_headers(headers);
    }

    let exporter = builder.build().map_err(|e| {
        error!("Failed to build metric exporter: {}. Metrics will not be sent to backend.", e);
        TelemetryError::InitializationError(format!("Failed to build metric exporter: {}", e))
    })?;

    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(resource)
        .build())
}

pub fn shutdown_metrics(provider: SdkMeterProvider) -> Result<(), String> {
    if let Err(e) = provider.shutdown() {
        error!("Error shutting down meter provider: {}", e);
        return Err(format!("meter provider: {}", e));
    }
    Ok(())
}
