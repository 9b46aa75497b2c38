//! TOML-based configuration for Quarry.
//!
//! Example configuration:
//! ```toml
//! [postprocess]
//! max_iterations = 50
//! cte_fix = true
//! cte_cross_join = true
//! subquery_join = true
//! validate_cte_scopes = true
//!
//! [projection]
//! collision_separator = "_"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Postprocessing pipeline.
    pub postprocess: PostprocessSettings,

    /// Output column naming.
    pub projection: ProjectionSettings,
}

/// Postprocessing pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PostprocessSettings {
    /// Iteration cap for the fixed-point loop.
    pub max_iterations: usize,

    /// Hoist nested CTE definitions to the root query.
    pub cte_fix: bool,

    /// Turn cross joins to CTE references into inner joins.
    pub cte_cross_join: bool,

    /// Turn EXISTS subqueries into joins where the shape allows it.
    pub subquery_join: bool,

    /// Reject trees where a CTE body reads an alias declared outside it.
    pub validate_cte_scopes: bool,
}

impl Default for PostprocessSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            cte_fix: true,
            cte_cross_join: true,
            subquery_join: true,
            validate_cte_scopes: true,
        }
    }
}

/// Output column naming.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectionSettings {
    /// Joins a colliding column name and its counter (`Name_1`).
    pub collision_separator: String,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            collision_separator: "_".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.postprocess.max_iterations == 0 {
            return Err(SettingsError::InvalidConfig(
                "postprocess.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.projection.collision_separator.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "projection.collision_separator must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
