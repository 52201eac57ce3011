pub mod cli;
pub mod models;
pub mod sources;
pub mod validation;


pub use cli::{Cli, CommandArgs, Commands};
pub use models::{Settings, WebServerConfig};

use anyhow::Result;

use crate::settings::validation::validate_config;

/// Load and validate settings from all available sources.
///
/// # Precedence Order
/// 1. CLI parameters override all other sources
/// 2. `STRAND__`-prefixed environment variables (and `.env`) override the file
/// 3. The settings file provides base values; every field has a default
pub fn settings(args: &CommandArgs) -> Result<Settings> {
    sources::load_dotenv();

    let settings = sources::load_from_sources(args.config.as_deref(), sources::environment(None))?;
    let settings = sources::apply_command_line_args(settings, args);

    validate_config(&settings)?;

    Ok(settings)
}
