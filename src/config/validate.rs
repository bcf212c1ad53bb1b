// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ClusterOptions, ClusterSection};
use crate::errors::{ClusterError, Result};
use crate::fs::FileSystem;

/// Validate a raw section before it is resolved.
///
/// This checks:
/// - the match pattern, when given, is non-empty and a valid glob
/// - the compiler command, when given, is non-empty
pub fn validate_section(section: &ClusterSection) -> Result<()> {
    if let Some(ref pattern) = section.match_pattern {
        validate_match_pattern(pattern)?;
    }

    if let Some(ref compiler) = section.compiler {
        if compiler.trim().is_empty() {
            return Err(ClusterError::ConfigError(
                "compiler command must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validate resolved options against the filesystem.
///
/// This checks:
/// - the source directory exists
/// - the match pattern is valid
/// - every ad-hoc file lives under the source directory
pub fn validate_options(options: &ClusterOptions, fs: &dyn FileSystem) -> Result<()> {
    if !fs.is_dir(&options.directory) {
        return Err(ClusterError::ConfigError(format!(
            "source directory {:?} does not exist",
            options.directory
        )));
    }

    validate_match_pattern(&options.match_pattern)?;

    for file in &options.files {
        if !file.starts_with(&options.directory) {
            return Err(ClusterError::ConfigError(format!(
                "file {:?} is outside the source directory {:?}",
                file, options.directory
            )));
        }
    }

    Ok(())
}

fn validate_match_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(ClusterError::ConfigError(
            "match pattern must not be empty".to_string(),
        ));
    }
    Glob::new(pattern).map_err(|e| {
        ClusterError::ConfigError(format!("invalid match pattern {pattern}: {e}"))
    })?;
    Ok(())
}
