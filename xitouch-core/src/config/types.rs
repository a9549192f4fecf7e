//! Configuration data structures.
//!
//! Every struct rejects unknown fields and defaults every missing one through
//! [`super::defaults`].

use serde::Deserialize;
use std::path::PathBuf;
use super::defaults;

/// Settings for the logging subsystem.
///
/// ```
/// use xitouch_core::config::LoggingConfig;
///
/// let config: LoggingConfig = toml::from_str(r#"level = "debug""#).unwrap();
/// assert_eq!(config.level, "debug");
/// assert_eq!(config.format, "text");
/// assert_eq!(config.file_path, None);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Minimum level: "trace", "debug", "info", "warn" or "error".
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Optional log file. `None` disables file logging.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// "text" or "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        defaults::default_logging_config()
    }
}

/// Bookkeeping limits for touch sequences.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TouchConfig {
    /// Maximum number of phase events kept per touch for replay to a new owner.
    #[serde(default = "defaults::default_history_size")]
    pub history_size: usize,
    /// Number of touch slots preallocated for each device. Slots grow on demand.
    #[serde(default = "defaults::default_initial_slots")]
    pub initial_slots: usize,
}

impl Default for TouchConfig {
    fn default() -> Self {
        defaults::default_touch_config()
    }
}

/// Sizing of the bounded producer queue in front of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    #[serde(default = "defaults::default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        defaults::default_queue_config()
    }
}

/// Root configuration structure.
///
/// ```
/// use xitouch_core::config::CoreConfig;
///
/// let config: CoreConfig = toml::from_str(r#"
/// [logging]
/// level = "warn"
///
/// [touch]
/// history_size = 32
/// "#).unwrap();
/// assert_eq!(config.logging.level, "warn");
/// assert_eq!(config.touch.history_size, 32);
/// assert_eq!(config.queue.capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoreConfig {
    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
    #[serde(default = "defaults::default_touch_config")]
    pub touch: TouchConfig,
    #[serde(default = "defaults::default_queue_config")]
    pub queue: QueueConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logging_config_default_values() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.file_path, None);
        assert_eq!(config.format, "text");
    }

    #[test]
    fn test_core_config_deserialize_empty() {
        let config: CoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_core_config_deserialize_full() {
        let toml_str = r#"
            [logging]
            level = "trace"
            file_path = "/tmp/xitouch.log"
            format = "json"

            [touch]
            history_size = 8
            initial_slots = 2

            [queue]
            capacity = 4
        "#;
        let config: CoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.file_path, Some(PathBuf::from("/tmp/xitouch.log")));
        assert_eq!(config.touch, TouchConfig { history_size: 8, initial_slots: 2 });
        assert_eq!(config.queue, QueueConfig { capacity: 4 });
    }

    #[test]
    fn test_touch_config_rejects_unknown_field() {
        let result: Result<TouchConfig, _> = toml::from_str("history_size = 4\nmax_fingers = 10");
        assert!(result.is_err());
    }
}
