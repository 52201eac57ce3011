use strand_telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Config failed: {0}")]
    ConfigFailed(String),
    #[error("Server error: {0}")]
    ServerError(String),
}

impl From<TelemetryError> for CliError {
    fn from(err: TelemetryError) -> Self {
        CliError::ConfigFailed(format!("Telemetry error: {}", err))
    }
}
