use std::{error::Error as StdError, fmt};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Telemetry initialization error: {0}")]
    InitializationError(String),
    #[error("Invalid telemetry config: {0}")]
    InvalidConfig(String),
}

/// Failure pushing a log entry to the remote log endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExportError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote log endpoint responded with status {0}")]
    Status(u16),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Owned snapshot of an error handed to a handle.
///
/// Keeps the display message and the whole `source()` chain, each cause as
/// its own snapshot, so the error can outlive the caller's value and still be
/// attached to a span or a report with its causes intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    message: String,
    source: Option<Box<RecordedError>>,
}

impl RecordedError {
    pub fn new<E>(err: &E) -> Self
    where
        E: StdError + ?Sized,
    {
        Self {
            message: err.to_string(),
            source: err.source().map(|cause| Box::new(Self::new(cause))),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the causes, outermost first.
    pub fn causes(&self) -> Vec<&str> {
        let mut causes = Vec::new();
        let mut next = self.source.as_deref();
        while let Some(cause) = next {
            causes.push(cause.message());
            next = cause.source.as_deref();
        }
        causes
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for RecordedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// A recovered panic payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("panic: {0}")]
pub struct PanicError(pub String);
