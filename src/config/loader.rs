// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config::model::{ClusterOptions, ClusterSection, ConfigFile};
use crate::config::validate::validate_section;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `ConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and run basic validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let config = load_from_path(&path)?;
    validate_section(&config.cluster)?;
    Ok(config)
}

/// Merge an optional config file with CLI values and resolve against `cwd`.
///
/// CLI values win over file values.
pub fn resolve_options(
    config_path: Option<&Path>,
    cli: ClusterSection,
    cwd: &Path,
) -> Result<ClusterOptions> {
    let base = match config_path {
        Some(path) => load_and_validate(path)?.cluster,
        None => ClusterSection::default(),
    };

    let merged = base.overlay(cli);
    validate_section(&merged)?;

    Ok(ClusterOptions::from_section(merged, cwd))
}
