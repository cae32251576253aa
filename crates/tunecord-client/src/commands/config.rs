//! Configuration commands.

use crate::config::{ClientConfig, Overrides};
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
pub fn dump(config: &ClientConfig) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", ClientConfig::default_path().display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig, overrides: &Overrides) -> ClientResult<()> {
    let ipc = config
        .to_ipc_config(overrides)
        .map_err(ClientError::Config)?;

    for button in &ipc.presence.buttons {
        if !button.url.starts_with("http://") && !button.url.starts_with("https://") {
            return Err(ClientError::Config(format!(
                "button '{}' must link to an http(s) URL",
                button.label
            )));
        }
    }

    println!("IPC directory: {}", ipc.resolved_ipc_dir().display());
    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path() -> ClientResult<()> {
    let config_path = ClientConfig::default_path();
    println!("config: {}", config_path.display());
    Ok(())
}
