use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing::{error, info};

use crate::{
    config::{CollectorConfig, signal_endpoint},
    error::TelemetryError,
    telemetry::{EXPORT_TIMEOUT, auth_headers},
};

pub fn init_traces(
    collector: &CollectorConfig,
    resource: Resource,
) -> Result<SdkTracerProvider, TelemetryError> {
    let endpoint_url = signal_endpoint(&collector.endpoint, "v1/traces");
    info!("Initializing traces with endpoint: {}", endpoint_url);

    let mut builder = SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .with_endpoint(&endpoint_url)
        .with_timeout(EXPORT_TIMEOUT);

    if let Some(headers) = auth_headers(&collector.auth) {
        builder = builder.with_headers(headers);
    }

    let exporter = builder.build().map_err(|e| {
        error!("Failed to build span exporter: {}. Spans will not be sent to backend.", e);
        TelemetryError::InitializationError(format!("Failed to build span exporter: {}", e))
    })?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

pub fn shutdown_traces(provider: SdkTracerProvider) -> Result<(), String> {
    if let Err(e) = provider.shutdown() {
        error!("Error shutting down tracer provider: {}", e);
        return Err(format!("tracer provider: {}", e));
    }
    Ok(())
}
