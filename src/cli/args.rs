//! Command-line argument definitions and helpers.

use std::path::PathBuf;

use clap::Args;

use crate::config::ConfigSource;

/// Global arguments that apply to all commands.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to the configuration file.
    #[arg(long = "config-file", global = true)]
    pub config_file: Option<PathBuf>,

    /// Configuration overrides in the form section.name=value.
    #[arg(long = "config", value_parser = parse_config_override, global = true)]
    pub config_overrides: Vec<(String, String)>,

    /// Format output as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    /// Convert to a ConfigSource for reading configuration.
    pub fn to_config_source(&self) -> ConfigSource {
        ConfigSource {
            config_file: self.config_file.clone(),
            overrides: self.config_overrides.clone(),
        }
    }
}

/// Parse a config override from "name=value" format.
fn parse_config_override(s: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid config override '{}': expected name=value", s))?;
    Ok((name.to_string(), value.to_string()))
}
