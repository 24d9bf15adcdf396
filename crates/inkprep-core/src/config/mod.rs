//! Configuration management for inkprep.
//!
//! Configuration is loaded from a TOML file, either one passed explicitly or
//! the platform default location, with sensible defaults for every section.
//! The ordered step list lives here in its raw form; typed step parameters are
//! produced later by [`crate::registry::StepRegistry::plan`].

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for inkprep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Write a PNG snapshot after every successful step
    pub save_intermediate: bool,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Input discovery settings
    pub processing: ProcessingConfig,

    /// Resource limits
    pub limits: LimitsConfig,

    /// Report output settings
    pub report: ReportConfig,

    /// Ordered preprocessing steps
    pub steps: Vec<StepConfig>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.inkprep.inkprep/config.toml
    /// - Linux: ~/.config/inkprep/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\inkprep\config\config.toml
    ///
    /// Falls back to ~/.inkprep/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "inkprep", "inkprep")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".inkprep").join("config.toml")
            })
    }

    /// A starter configuration with a typical binarization pipeline.
    ///
    /// Written by `inkprep config init`; [`Config::default`] has no steps.
    pub fn starter() -> Self {
        let mut threshold_params = toml::Table::new();
        threshold_params.insert("method".into(), toml::Value::String("otsu".into()));

        let mut blur_params = toml::Table::new();
        blur_params.insert("ksize".into(), toml::Value::Integer(3));

        Self {
            steps: vec![
                StepConfig::new("grayscale"),
                StepConfig::with_params("median_blur", blur_params).disabled(),
                StepConfig::with_params("threshold", threshold_params),
                StepConfig::new("deskew"),
            ],
            ..Self::default()
        }
    }

    /// Resolved log file destination (with ~ expansion), if any.
    pub fn log_destination(&self) -> Option<PathBuf> {
        self.logging.destination.as_ref().map(|path| {
            let path_str = path.to_string_lossy();
            let expanded = shellexpand::tilde(&path_str);
            PathBuf::from(expanded.into_owned())
        })
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
