// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading.
//!
//! Lookup order:
//! 1. `foreman.yml` in the starting directory
//! 2. `~/.foreman/config.yml`
//!
//! A missing file is not an error; defaults apply.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

use super::types::OrchestratorConfig;

/// Project-local configuration file name.
pub const PROJECT_CONFIG: &str = "foreman.yml";

/// Path of the user-level configuration file, if a home directory exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".foreman").join("config.yml"))
}

/// Load configuration starting from `dir`, falling back to the user
/// file and then to defaults.
pub fn load_config(dir: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let project = dir.join(PROJECT_CONFIG);
    if project.is_file() {
        debug!(path = %project.display(), "loading project config");
        return load_file(&project);
    }

    if let Some(user) = user_config_path() {
        if user.is_file() {
            debug!(path = %user.display(), "loading user config");
            return load_file(&user);
        }
    }

    debug!("no config file found, using defaults");
    Ok(OrchestratorConfig::default())
}

/// Load and parse a specific configuration file.
pub fn load_file(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.worker.program, "foreman-worker");
    }

    #[test]
    fn test_project_config_preferred() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(PROJECT_CONFIG),
            "worker:\n  program: custom-agent\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.worker.program, "custom-agent");
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_CONFIG);
        std::fs::write(&path, "worker: [not a map").unwrap();
        assert!(load_file(&path).is_err());
    }
}
