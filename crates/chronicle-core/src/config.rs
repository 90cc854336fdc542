//! Session configuration loaded from YAML.
//!
//! Every field has a default, so an empty document (or no file at all) is
//! a valid configuration:
//!
//! ```yaml
//! clock:
//!   start_of_cataclysm: 0
//!   start_of_game: 0
//! achievements:
//!   enabled: true
//!   active: true
//! diagnostics:
//!   check_on_start: true
//! logging:
//!   level: info
//!   format: text
//! ```

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Epochs of the game clock.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Achievements tracker settings.
    #[serde(default)]
    pub achievements: AchievementsConfig,

    /// Descriptor check pass settings.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SessionConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `CHRONICLE_LOG` overrides `logging.level`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Game clock epochs, in turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Turn of the cataclysm.
    #[serde(default)]
    pub start_of_cataclysm: u64,

    /// Turn the game starts on; never before the cataclysm.
    #[serde(default)]
    pub start_of_game: u64,
}

/// Achievements tracker settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AchievementsConfig {
    /// Initial value of the enabled flag passed to callbacks.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Watch statistics live. When false, values are read once and no
    /// achievement is ever decided.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Default for AchievementsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            active: true,
        }
    }
}

/// Descriptor check pass settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiagnosticsConfig {
    /// Run the cross-reference pass when a session starts.
    #[serde(default = "default_true")]
    pub check_on_start: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            check_on_start: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format of the log lines.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LoggingConfig {
    /// Apply the `CHRONICLE_LOG` override, if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CHRONICLE_LOG") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.clock.start_of_game, 0);
        assert!(config.achievements.enabled);
        assert!(config.achievements.active);
        assert!(config.diagnostics.check_on_start);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
clock:
  start_of_cataclysm: 100
  start_of_game: 7200
achievements:
  enabled: false
  active: false
diagnostics:
  check_on_start: false
logging:
  format: json
";
        let config = SessionConfig::parse(yaml).ok();
        assert_eq!(config.as_ref().map(|c| c.clock.start_of_cataclysm), Some(100));
        assert_eq!(config.as_ref().map(|c| c.clock.start_of_game), Some(7200));
        assert_eq!(config.as_ref().map(|c| c.achievements.enabled), Some(false));
        assert_eq!(config.as_ref().map(|c| c.achievements.active), Some(false));
        assert_eq!(
            config.as_ref().map(|c| c.diagnostics.check_on_start),
            Some(false)
        );
        assert_eq!(config.map(|c| c.logging.format), Some(LogFormat::Json));
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = SessionConfig::parse("clock:\n  start_of_game: 5\n").ok();
        assert_eq!(config.as_ref().map(|c| c.clock.start_of_cataclysm), Some(0));
        assert_eq!(config.map(|c| c.achievements.active), Some(true));
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(matches!(
            SessionConfig::parse("clock: [1, 2"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
