use serde::{Deserialize, Serialize};
use strand_telemetry::TelemetryConfig;

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebServerConfig {
    /// IP address to listen on
    pub host: String,
    /// Port to listen on, 0 picks a free one
    pub port: u16,
}

impl Default for WebServerConfig {
    fn default() -> Self {
        WebServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Settings of the strand service, merged from file, environment and CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub telemetry: TelemetryConfig,
    pub webserver: WebServerConfig,
}
