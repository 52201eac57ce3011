use std::{collections::HashMap, time::Duration};

use base64::Engine;
use opentelemetry::KeyValue;
use opentelemetry_sdk::{Resource, metrics::SdkMeterProvider, trace::SdkTracerProvider};
use tracing::info;

use crate::{
    config::{BasicAuth, TelemetryConfig},
    error::TelemetryError,
    metrics::{init_metrics, shutdown_metrics},
    traces::{init_traces, shutdown_traces},
};

// Upper bound for one export round trip, so an unreachable collector is noticed
pub(crate) const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_telemetry(
    config: &TelemetryConfig,
    resource: Resource,
) -> Result<(Option<SdkTracerProvider>, Option<SdkMeterProvider>), TelemetryError> {
    info!(
        "Initializing telemetry with configuration: traces_enabled={}, metrics_enabled={}",
        config.traces.enabled, config.metrics.enabled
    );

    let tracer_provider = if config.traces.enabled {
        let provider = init_traces(&config.collector, resource.clone())?;
        info!("Traces initialized successfully with endpoint: {}", config.collector.endpoint);
        Some(provider)
    } else {
        info!("Traces are disabled, skipping traces initialization");
        None
    };

    let meter_provider = if config.metrics.enabled {
        let provider = init_metrics(&config.collector, resource)?;
        info!("Metrics initialized successfully with endpoint: {}", config.collector.endpoint);
        Some(provider)
    } else {
        info!("Metrics are disabled, skipping metrics initialization");
        None
    };

    info!("Telemetry initialization completed successfully");
    Ok((tracer_provider, meter_provider))
}

pub fn shutdown_telemetry(
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
) {
    info!("Shutting down telemetry");

    if let Some(provider) = tracer_provider {
        if let Err(e) = shutdown_traces(provider) {
            tracing::warn!("Error shutting down traces: {}", e);
        }
    }

    if let Some(provider) = meter_provider {
        if let Err(e) = shutdown_metrics(provider) {
            tracing::warn!("Error shutting down metrics: {}", e);
        }
    }
}

/// Resource describing this process: the service name plus every global
/// label, sorted by key.
pub fn build_resource(service_name: String, labels: &HashMap<String, String>) -> Resource {
    let mut labels: Vec<_> = labels.iter().collect();
    labels.sort();

    let mut resource_builder = Resource::builder().with_service_name(service_name);
    for (key, value) in labels {
        resource_builder = resource_builder.with_attribute(KeyValue::new(key.clone(), value.clone()));
    }
    resource_builder.build()
}

// Authorization header for the OTLP exporters, when basic auth is on
pub(crate) fn auth_headers(auth: &BasicAuth) -> Option<HashMap<String, String>> {
    if !auth.enabled {
        return None;
    }
    let auth_string = format!("{}:{}", auth.username, auth.password);
    let encoded = base64::engine::general_purpose::STANDARD.encode(auth_string);

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
    Some(headers)
}
