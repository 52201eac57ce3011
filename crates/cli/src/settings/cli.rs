use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

/// Command-line interface for the strand demo service
#[derive(Parser, Clone, Debug, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Clone, Debug, Subcommand, Deserialize)]
pub enum Commands {
    /// Start the instrumented HTTP service
    Serve(CommandArgs),

    /// Resolve and validate the settings, then print them as TOML
    Check(CommandArgs),
}

/// Common command-line arguments for all commands
#[derive(Args, Deserialize, Clone, Debug, Default)]
pub struct CommandArgs {
    /// Path to a TOML settings file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Emit JSON log lines instead of text
    #[arg(long)]
    pub json_logs: Option<bool>,

    /// Service name attached to every log line, span and metric
    #[arg(long)]
    pub service_name: Option<String>,

    /// Job name attached to every log line
    #[arg(long)]
    pub job_name: Option<String>,

    /// Telemetry export arguments
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    /// Web server configuration arguments
    #[command(flatten)]
    pub webserver: WebserverArgs,
}

/// Telemetry export arguments
#[derive(Args, Deserialize, Clone, Debug, Default)]
#[group(required = false, multiple = true)]
pub struct TelemetryArgs {
    /// Base URL of the OTLP/HTTP collector
    #[arg(long)]
    pub collector_endpoint: Option<String>,

    /// Export spans to the collector
    #[arg(long)]
    pub traces: Option<bool>,

    /// Export metrics to the collector
    #[arg(long)]
    pub metrics: Option<bool>,

    /// Push log lines to this Loki-compatible endpoint (enables remote logs)
    #[arg(long)]
    pub remote_logs_endpoint: Option<String>,

    /// Report errors to this Sentry DSN (enables error reporting)
    #[arg(long)]
    pub sentry_dsn: Option<String>,
}

/// Web server configuration arguments
#[derive(Args, Deserialize, Clone, Debug, Default)]
#[group(required = false, multiple = true)]
pub struct WebserverArgs {
    /// IP address for the webserver to listen on
    #[arg(long)]
    pub host: Option<String>,

    /// Port number for the webserver to listen on
    #[arg(short, long)]
    pub port: Option<u16>,
}
