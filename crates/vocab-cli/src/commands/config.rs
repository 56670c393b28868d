use std::path::{Path, PathBuf};

use crate::cli::{ConfigCommands, ConfigKey};
use crate::config::{default_config_path, normalize_server_url, CliConfig, EffectiveConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, effective: &EffectiveConfig) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            for line in format_config_lines(effective, &default_config_path()?) {
                println!("{line}");
            }
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            let mut config = CliConfig::load()?;
            apply_config_value(&mut config, key, Some(&value))?;
            let path = config.save()?;
            forget_cursor_if_remote_changed(key, &effective.cursor_path)?;
            println!("Saved {}", path.display());
            Ok(())
        }
        ConfigCommands::Unset { key } => {
            let mut config = CliConfig::load()?;
            apply_config_value(&mut config, key, None)?;
            let path = config.save()?;
            forget_cursor_if_remote_changed(key, &effective.cursor_path)?;
            println!("Saved {}", path.display());
            Ok(())
        }
    }
}

pub fn apply_config_value(
    config: &mut CliConfig,
    key: ConfigKey,
    value: Option<&str>,
) -> Result<(), CliError> {
    let value = value.map(str::trim).filter(|value| !value.is_empty());
    match key {
        ConfigKey::ServerUrl => {
            config.server_url = value.map(normalize_server_url).transpose()?;
        }
        ConfigKey::Token => config.token = value.map(str::to_string),
        ConfigKey::DbPath => config.db_path = value.map(PathBuf::from),
    }
    Ok(())
}

/// A different server or account starts from a full pull.
fn forget_cursor_if_remote_changed(key: ConfigKey, cursor_path: &Path) -> Result<(), CliError> {
    if matches!(key, ConfigKey::ServerUrl | ConfigKey::Token) && cursor_path.exists() {
        std::fs::remove_file(cursor_path)?;
        tracing::info!("Cleared sync cursor at {}", cursor_path.display());
    }
    Ok(())
}

pub fn format_config_lines(effective: &EffectiveConfig, config_path: &Path) -> Vec<String> {
    vec![
        format!("config file: {}", config_path.display()),
        format!("database:    {}", effective.db_path.display()),
        format!("cursor file: {}", effective.cursor_path.display()),
        format!(
            "server url:  {}",
            effective.server_url.as_deref().unwrap_or("(not set)")
        ),
        format!(
            "token:       {}",
            if effective.token.is_some() {
                "(set)"
            } else {
                "(not set)"
            }
        ),
    ]
}
