use std::{collections::BTreeMap, error::Error as StdError, time::Duration};

use serde_json::Value;

use crate::config::ErrorReportingConfig;

/// Forwards errors to an error-tracking backend.
pub trait ErrorReporter: Send + Sync {
    fn capture(
        &self,
        err: &(dyn StdError + 'static),
        tags: &BTreeMap<String, String>,
        extras: &BTreeMap<String, Value>,
    );
}

/// Reports through the process-wide Sentry client.
///
/// Each capture opens its own scope for the tags and extras, then blocks for
/// at most `flush_timeout` while the event is sent.
#[derive(Debug, Clone)]
pub struct SentryReporter {
    flush_timeout: Duration,
}

impl SentryReporter {
    pub const fn new(flush_timeout: Duration) -> Self {
        Self { flush_timeout }
    }

    pub const fn from_config(config: &ErrorReportingConfig) -> Self {
        Self::new(Duration::from_millis(config.flush_timeout_ms))
    }

    /// Installs the global Sentry client. The returned guard flushes on drop
    /// and must be kept alive for as long as reports are sent.
    pub fn init(service_name: &str, config: &ErrorReportingConfig) -> sentry::ClientInitGuard {
        sentry::init((
            config.dsn.as_str(),
            sentry::ClientOptions {
                release: Some(service_name.to_string().into()),
                environment: Some(config.environment.clone().into()),
                traces_sample_rate: 1.0,
                shutdown_timeout: Duration::from_millis(config.flush_timeout_ms),
                ..Default::default()
            },
        ))
    }
}

impl ErrorReporter for SentryReporter {
    fn capture(
        &self,
        err: &(dyn StdError + 'static),
        tags: &BTreeMap<String, String>,
        extras: &BTreeMap<String, Value>,
    ) {
        sentry::with_scope(
            |scope| {
                for (k, v) in tags {
                    scope.set_tag(k, v);
                }
                for (k, v) in extras {
                    scope.set_extra(k, v.clone());
                }
            },
            || {
                sentry::capture_error(err);
            },
        );

        if let Some(client) = sentry::Hub::current().client() {
            client.flush(Some(self.flush_timeout));
        }
    }
}
