use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde_json::{Value, json};

use crate::{
    config::RemoteLogsConfig,
    error::{ExportError, TelemetryError},
    exporter::{LogEntry, RemoteLogTransport},
};

const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pushes log entries to a Loki-compatible `/loki/api/v1/push` endpoint.
pub struct LokiTransport {
    client: reqwest::Client,
    endpoint: url::Url,
    auth_header: Option<String>,
}

impl LokiTransport {
    pub fn new(config: &RemoteLogsConfig) -> Result<Self, TelemetryError> {
        let endpoint = url::Url::parse(&config.endpoint).map_err(|e| {
            TelemetryError::InvalidConfig(format!("remote_logs.endpoint: {}", e))
        })?;

        let client = reqwest::Client::builder().timeout(PUSH_TIMEOUT).build().map_err(|e| {
            TelemetryError::InitializationError(format!("Failed to build log push client: {}", e))
        })?;

        // Add basic authentication if enabled
        let auth_header = config.auth.enabled.then(|| {
            let auth_string = format!("{}:{}", config.auth.username, config.auth.password);
            let encoded = base64::engine::general_purpose::STANDARD.encode(auth_string);
            format!("Basic {}", encoded)
        });

        Ok(Self {
            client,
            endpoint,
            auth_header,
        })
    }
}

/// Request body for a single-entry push.
pub fn push_body(entry: &LogEntry) -> Value {
    json!({
        "streams": [{
            "stream": entry.labels,
            "values": [[entry.timestamp_nanos.to_string(), entry.message]],
        }]
    })
}

#[async_trait]
impl RemoteLogTransport for LokiTransport {
    async fn push(&self, entry: &LogEntry) -> Result<(), ExportError> {
        let body = serde_json::to_vec(&push_body(entry))
            .map_err(|e| ExportError::Serialization(e.to_string()))?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(auth) = &self.auth_header {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send().await.map_err(|e| ExportError::Transport(e.to_string()))?;
        let status = response.status();
        if status.as_u16() >= 300 {
            return Err(ExportError::Status(status.as_u16()));
        }
        Ok(())
    }
}
