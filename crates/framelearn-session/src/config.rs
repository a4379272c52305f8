//! YAML configuration loading for a learning session.
//!
//! Loads a [`SessionConfig`] from a YAML file on disk. Missing fields fall
//! back to the fixed defaults, so a config file only needs to name what it
//! changes.

use framelearn_core::{FramelearnError, Result, SessionConfig};
use std::path::Path;

/// Load a [`SessionConfig`] from a YAML file at `path`.
///
/// # Errors
///
/// Returns [`FramelearnError::Config`] if the file cannot be read or the
/// YAML is invalid.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        FramelearnError::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|e| FramelearnError::Config(format!("Failed to parse config YAML: {e}")))
}
