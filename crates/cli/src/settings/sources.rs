use anyhow::{Context, Result};
use config::{Config as ConfigSource, Environment, File, Map};
use dotenvy::dotenv;
use tracing::debug;

use crate::settings::{cli::CommandArgs, models::Settings};

const ENV_PREFIX: &str = "STRAND";
const ENV_SEPARATOR: &str = "__";

/// Loads `.env` into the process environment if present.
pub fn load_dotenv() {
    if let Ok(path) = dotenv() {
        debug!("Loaded environment from {}", path.display());
    }
}

/// Environment source for `STRAND__SECTION__KEY=value` variables. `vars`
/// replaces the process environment when given.
pub fn environment(vars: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .source(vars)
}

/// Reads the settings file (if any) and overlays the environment on top.
pub fn load_from_sources(config_path: Option<&str>, env: Environment) -> Result<Settings> {
    let mut builder = ConfigSource::builder();
    if let Some(path) = config_path {
        builder = builder.add_source(File::with_name(path));
    }

    builder
        .add_source(env)
        .build()
        .context("Failed to build config")?
        .try_deserialize()
        .context("Failed to deserialize settings")
}

/// Apply CLI arguments to the settings
pub fn apply_command_line_args(mut settings: Settings, args: &CommandArgs) -> Settings {
    let telemetry = &mut settings.telemetry;

    if let Some(level) = &args.log_level {
        telemetry.logging.level = level.to_lowercase();
    }
    if let Some(json) = args.json_logs {
        telemetry.logging.json = json;
    }
    if let Some(name) = &args.service_name {
        telemetry.service_name = name.clone();
    }
    if let Some(name) = &args.job_name {
        telemetry.job_name = name.clone();
    }

    // Apply telemetry export arguments
    if let Some(endpoint) = &args.telemetry.collector_endpoint {
        telemetry.collector.endpoint = endpoint.clone();
    }
    if let Some(enabled) = args.telemetry.traces {
        telemetry.traces.enabled = enabled;
    }
    if let Some(enabled) = args.telemetry.metrics {
        telemetry.metrics.enabled = enabled;
    }
    if let Some(endpoint) = &args.telemetry.remote_logs_endpoint {
        telemetry.remote_logs.enabled = true;
        telemetry.remote_logs.endpoint = endpoint.clone();
    }
    if let Some(dsn) = &args.telemetry.sentry_dsn {
        telemetry.error_reporting.enabled = true;
        telemetry.error_reporting.dsn = dsn.clone();
    }

    // Apply webserver arguments
    if let Some(host) = &args.webserver.host {
        settings.webserver.host = host.clone();
    }
    if let Some(port) = args.webserver.port {
        settings.webserver.port = port;
    }

    settings
}
