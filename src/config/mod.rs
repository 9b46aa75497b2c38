//! Configuration module for Quarry.
//!
//! Handles the TOML settings file that tunes projection naming and the
//! postprocessing pipeline.

mod settings;

pub use settings::{PostprocessSettings, ProjectionSettings, Settings, SettingsError};
