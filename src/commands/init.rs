use crate::commands::Out;
use crate::{Result, Settings};
use anyhow::Context;
use std::path::Path;

/// Creates the home directory and an initial `settings.json` pointing at the backend.
///
/// # Arguments
/// - `home` - The directory that will hold the settings, e.g. `$HOME/balancesheet`
/// - `host` - The host name or IP address of the backend.
/// - `port` - The port of the backend.
///
/// # Errors
/// - Returns an error if `host` or `port` are invalid or if any file operations fail.
pub async fn init(home: &Path, host: &str, port: u16) -> Result<Out<()>> {
    let settings = Settings::create(home, host, port)
        .await
        .context("Unable to create the home directory and settings")?;
    Ok(format!(
        "Successfully created '{}', the backend is expected at {}",
        settings.settings_path().display(),
        settings.base_url()?
    )
    .into())
}
