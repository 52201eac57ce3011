use std::net::IpAddr;

use crate::{error::CliError, settings::models::Settings};

/// Checks the merged settings before anything is started.
pub fn validate_config(settings: &Settings) -> Result<(), CliError> {
    settings.telemetry.validate()?;

    if settings.webserver.host.parse::<IpAddr>().is_err() {
        return Err(CliError::ConfigFailed(format!(
            "webserver.host is not a valid IP address: {}",
            settings.webserver.host
        )));
    }

    Ok(())
}
