//! Layered configuration per `SPEC_FULL.md` §10.3: compiled defaults, then an
//! optional `kubernator.yaml` at the walk root, then CLI flags (narrowest
//! wins). Context-tree overrides written by in-tree scripts are the final,
//! narrowest layer and are applied later, inside the walk itself.

use std::path::Path;

use serde::Deserialize;

use crate::error::{AppError, Result};

pub const CONFIG_FILE_NAME: &str = "kubernator.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootConfig {
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub warn_fatal: Option<bool>,
    #[serde(default)]
    pub field_validation: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
}

impl RootConfig {
    /// Load `<root>/kubernator.yaml` if present; an absent file is the
    /// all-defaults configuration, not an error.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&text).map_err(|source| AppError::Config {
            path: path.display().to_string(),
            source,
        })
    }

    /// Merge a CLI-provided value over this layer; `None` leaves the
    /// narrower (file or default) value untouched.
    pub fn override_bool(base: Option<bool>, cli: Option<bool>) -> Option<bool> {
        cli.or(base)
    }

    pub fn override_string(base: &Option<String>, cli: &Option<String>) -> Option<String> {
        cli.clone().or_else(|| base.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RootConfig::load(dir.path()).unwrap();
        assert_eq!(config.dry_run, None);
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "warn_fatal: true\noutput_format: yaml\n").unwrap();
        let config = RootConfig::load(dir.path()).unwrap();
        assert_eq!(config.warn_fatal, Some(true));
        assert_eq!(config.output_format.as_deref(), Some("yaml"));
    }

    #[test]
    fn cli_flag_overrides_file_value() {
        let merged = RootConfig::override_bool(Some(false), Some(true));
        assert_eq!(merged, Some(true));
    }

    #[test]
    fn cli_absence_falls_back_to_file_value() {
        let merged = RootConfig::override_bool(Some(true), None);
        assert_eq!(merged, Some(true));
    }
}
