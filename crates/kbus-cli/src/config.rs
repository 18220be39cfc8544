//! Bus configuration loading.
//!
//! Reads the `[kbus]` section from `config/default.toml` (or the file given
//! with `--config`) into a [`KbusConfig`].

use std::path::Path;

use anyhow::{Context, Result};
use kbus_kernel::KbusConfig;
use serde::Deserialize;

/// Where the configuration is looked up when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// The parts of the configuration file this binary cares about.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    kbus: KbusConfig,
}

/// Load the bus configuration.
///
/// An explicit `path` must exist and parse.  Without one, a missing or
/// malformed `config/default.toml` falls back to the built-in defaults.
pub fn load_config(path: Option<&Path>) -> Result<KbusConfig> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        return parse_config(&content)
            .with_context(|| format!("invalid config {}", path.display()));
    }

    let content = match std::fs::read_to_string(DEFAULT_CONFIG_PATH) {
        Ok(c) => c,
        Err(_) => return Ok(KbusConfig::default()),
    };

    match parse_config(&content) {
        Ok(config) => Ok(config),
        Err(e) => {
            tracing::warn!(path = DEFAULT_CONFIG_PATH, error = %e, "ignoring malformed config");
            Ok(KbusConfig::default())
        }
    }
}

/// Parse the `[kbus]` table out of a TOML document.  Other tables are
/// ignored; missing keys keep their defaults.
pub fn parse_config(content: &str) -> Result<KbusConfig> {
    let file: ConfigFile = toml::from_str(content).context("failed to parse TOML")?;
    Ok(file.kbus)
}
