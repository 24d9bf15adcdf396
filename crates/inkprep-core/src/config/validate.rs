//! Configuration validation with range checks.

use crate::error::ConfigError;
use crate::report::ReportFormat;

use super::Config;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

impl Config {
    /// Validate configuration values are within acceptable ranges.
    ///
    /// Step parameters are not checked here; they are checked against each
    /// step's typed parameters when the pipeline is planned.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.processing.supported_formats.is_empty() {
            return Err(ConfigError::ValidationError(
                "processing.supported_formats must not be empty".into(),
            ));
        }
        let level = self.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {LOG_LEVELS:?}, got '{}'",
                self.logging.level
            )));
        }
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of {LOG_FORMATS:?}, got '{}'",
                self.logging.format
            )));
        }
        if ReportFormat::parse(&self.report.format).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "report.format must be \"json\" or \"jsonl\", got '{}'",
                self.report.format
            )));
        }
        if let Some(index) = self.steps.iter().position(|s| s.name.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "steps[{index}].name must not be empty"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StepConfig;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(Config::starter().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_file_size_limit() {
        let mut config = Config::default();
        config.limits.max_file_size_mb = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_file_size_mb"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_validate_accepts_uppercase_log_level() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_report_format() {
        let mut config = Config::default();
        config.report.format = "yaml".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("report.format"));
    }

    #[test]
    fn test_validate_rejects_empty_step_name() {
        let mut config = Config::default();
        config.steps.push(StepConfig::new("grayscale"));
        config.steps.push(StepConfig::new("  "));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("steps[1]"));
    }

    #[test]
    fn test_validate_rejects_empty_supported_formats() {
        let mut config = Config::default();
        config.processing.supported_formats.clear();
        assert!(config.validate().is_err());
    }
}
