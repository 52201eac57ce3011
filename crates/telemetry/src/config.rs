use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::TelemetryError;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 2000;

// Basic auth configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct BasicAuth {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

// OTLP collector shared by traces and metrics
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    pub endpoint: String,
    pub auth: BasicAuth,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            auth: BasicAuth::default(),
        }
    }
}

// Configuration for traces
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct TracesConfig {
    pub enabled: bool,
}

// Configuration for metrics
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

// Configuration for error reporting
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ErrorReportingConfig {
    pub enabled: bool,
    pub dsn: String,
    pub environment: String,
    pub flush_timeout_ms: u64,
}

impl Default for ErrorReportingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dsn: String::new(),
            environment: "production".to_string(),
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

// Configuration for pushing log lines to a log-aggregation endpoint
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteLogsConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub auth: BasicAuth,
    pub queue_capacity: usize,
}

impl Default for RemoteLogsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:3100/loki/api/v1/push".to_string(),
            auth: BasicAuth::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

// Local log output
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Static, process-wide telemetry settings.
///
/// Read-only once handed to [`crate::create_telemetry`] or
/// [`crate::Telemetry::builder`]; every handle derived from that environment
/// sees the same values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub job_name: String,
    pub collector: CollectorConfig,
    pub traces: TracesConfig,
    pub metrics: MetricsConfig,
    pub error_reporting: ErrorReportingConfig,
    pub remote_logs: RemoteLogsConfig,
    pub logging: LoggingConfig,
    pub global_labels: HashMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "strand".to_string(),
            job_name: "strand".to_string(),
            collector: CollectorConfig::default(),
            traces: TracesConfig::default(),
            metrics: MetricsConfig::default(),
            error_reporting: ErrorReportingConfig::default(),
            remote_logs: RemoteLogsConfig::default(),
            logging: LoggingConfig::default(),
            global_labels: HashMap::new(),
        }
    }
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.service_name.trim().is_empty() {
            return Err(invalid("service_name must not be empty"));
        }

        let collector_needed = self.traces.enabled || self.metrics.enabled;
        if collector_needed && self.collector.endpoint.trim().is_empty() {
            return Err(invalid("collector.endpoint is required when traces or metrics are enabled"));
        }
        if collector_needed {
            validate_auth("collector.auth", &self.collector.auth)?;
        }

        if self.error_reporting.enabled && self.error_reporting.dsn.trim().is_empty() {
            return Err(invalid("error_reporting.dsn is required when error reporting is enabled"));
        }

        if self.remote_logs.enabled {
            if self.remote_logs.endpoint.trim().is_empty() {
                return Err(invalid("remote_logs.endpoint is required when remote logs are enabled"));
            }
            if self.remote_logs.queue_capacity == 0 {
                return Err(invalid("remote_logs.queue_capacity must be greater than zero"));
            }
            validate_auth("remote_logs.auth", &self.remote_logs.auth)?;
        }

        Ok(())
    }
}

fn validate_auth(section: &str, auth: &BasicAuth) -> Result<(), TelemetryError> {
    if auth.enabled && auth.username.is_empty() {
        return Err(invalid(&format!("{section}.username is required when basic auth is enabled")));
    }
    Ok(())
}

fn invalid(reason: &str) -> TelemetryError {
    TelemetryError::InvalidConfig(reason.to_string())
}

/// Appends the OTLP signal path (`v1/traces`, `v1/metrics`) to a collector
/// base URL unless it is already there.
pub fn signal_endpoint(base: &str, signal_path: &str) -> String {
    let trimmed = signal_path.trim_start_matches('/');
    if base.ends_with(trimmed) || base.ends_with(&format!("{trimmed}/")) {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}{trimmed}")
    } else {
        format!("{base}/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TelemetryConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.traces.enabled);
        assert!(!config.remote_logs.enabled);
        assert_eq!(config.remote_logs.queue_capacity, 100);
        assert_eq!(config.error_reporting.flush_timeout_ms, 2000);
    }

    #[test]
    fn test_rejects_empty_service_name() {
        let config = TelemetryConfig {
            service_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TelemetryError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_enabled_signal_without_endpoint() {
        let mut config = TelemetryConfig::default();
        config.remote_logs.enabled = true;
        config.remote_logs.endpoint = String::new();
        assert!(config.validate().is_err());

        let mut config = TelemetryConfig::default();
        config.error_reporting.enabled = true;
        assert!(config.validate().is_err());

        let mut config = TelemetryConfig::default();
        config.traces.enabled = true;
        config.collector.endpoint = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_queue_capacity() {
        let mut config = TelemetryConfig::default();
        config.remote_logs.enabled = true;
        config.remote_logs.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_auth_without_username() {
        let mut config = TelemetryConfig::default();
        config.remote_logs.enabled = true;
        config.remote_logs.auth.enabled = true;
        assert!(config.validate().is_err());

        config.remote_logs.auth.username = "loki".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_signal_endpoint() {
        assert_eq!(
            signal_endpoint("http://collector:4318", "v1/traces"),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(
            signal_endpoint("http://collector:4318/", "v1/metrics"),
            "http://collector:4318/v1/metrics"
        );
        assert_eq!(
            signal_endpoint("http://collector:4318/v1/metrics", "v1/metrics"),
            "http://collector:4318/v1/metrics"
        );
        assert_eq!(
            signal_endpoint("http://collector:4318/v1/traces/", "v1/traces"),
            "http://collector:4318/v1/traces/"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TelemetryConfig = serde_json::from_str(
            r#"{"service_name":"checkout","remote_logs":{"enabled":true}}"#,
        )
        .unwrap();
        assert_eq!(config.service_name, "checkout");
        assert_eq!(config.job_name, "strand");
        assert!(config.remote_logs.enabled);
        assert_eq!(config.remote_logs.queue_capacity, 100);
    }
}
