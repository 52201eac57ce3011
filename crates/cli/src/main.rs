use clap::Parser;
use strand_cli::{
    server,
    settings::{Cli, Commands, settings as load_settings},
};
use strand_telemetry::create_telemetry;

/// Runs the strand demo service or checks its settings.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => {
            let settings = load_settings(&args)?;
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Serve(args) => {
            let settings = load_settings(&args)?;
            let instance = create_telemetry(&settings.telemetry)?;

            let mut log = instance.telemetry().root("startup");
            log.with_field("host", settings.webserver.host.as_str())
                .with_field("port", settings.webserver.port)
                .with_field("traces", settings.telemetry.traces.enabled)
                .with_field("metrics", settings.telemetry.metrics.enabled)
                .info("starting strand service");

            let result = server::serve(&settings.webserver, instance.telemetry().clone()).await;
            if let Err(e) = &result {
                log.with_error(e).error("strand service stopped with an error");
            }

            // provider shutdown blocks on the exporters' HTTP clients
            tokio::task::spawn_blocking(move || instance.shutdown()).await?;
            Ok(result?)
        }
    }
}
