//! Configuration loading for xitouch.
//!
//! [`ConfigLoader`] locates the configuration file, deserializes it from TOML,
//! applies defaults for missing values and validates the result.
//!
//! ```rust,ignore
//! use xitouch_core::config::ConfigLoader;
//!
//! match ConfigLoader::load() {
//!     Ok(config) => println!("history size: {}", config.touch.history_size),
//!     Err(e) => {
//!         xitouch_core::logging::init_minimal_logging();
//!         tracing::error!("Configuration loading failed: {}", e);
//!     }
//! }
//! ```
//!
//! ## Configuration File Location
//!
//! `ConfigLoader::load()` reads the file named by the `XITOUCH_CONFIG`
//! environment variable. If the variable is unset or the file does not exist,
//! the default configuration is used.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;
use crate::error::{ConfigError, CoreError};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "XITOUCH_CONFIG";

/// Namespace for configuration loading and validation.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates the configuration named by `XITOUCH_CONFIG`.
    ///
    /// A missing variable or missing file yields the validated defaults. Other
    /// read failures, parse failures and validation failures are returned.
    pub fn load() -> Result<CoreConfig, CoreError> {
        match env::var_os(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                match fs::read_to_string(&path) {
                    Ok(content) => Self::load_from_str(&content),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!("Config file {:?} not found, using defaults", path);
                        Self::defaults()
                    }
                    Err(e) => Err(CoreError::Config(ConfigError::ReadError { path, source: e })),
                }
            }
            None => Self::defaults(),
        }
    }

    /// Loads and validates the configuration at `path`. The file must exist.
    pub fn load_from_path(path: &Path) -> Result<CoreConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        })?;
        Self::load_from_str(&content)
    }

    /// Parses and validates TOML content. Blank content yields the defaults.
    pub fn load_from_str(content: &str) -> Result<CoreConfig, CoreError> {
        let mut config: CoreConfig = if content.trim().is_empty() {
            CoreConfig::default()
        } else {
            toml::from_str(content).map_err(|e| CoreError::Config(ConfigError::ParseError(e)))?
        };
        Self::validate_config(&mut config)?;
        Ok(config)
    }

    fn defaults() -> Result<CoreConfig, CoreError> {
        let mut config = CoreConfig::default();
        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Validates a parsed configuration, normalising string fields in place.
    ///
    /// - `logging.level` must be one of trace, debug, info, warn, error.
    /// - `logging.format` must be text or json.
    /// - `touch.history_size` must be at least 2 (a begin plus one update).
    /// - `touch.initial_slots` and `queue.capacity` must be at least 1.
    pub fn validate_config(config: &mut CoreConfig) -> Result<(), CoreError> {
        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {
                config.logging.level = level_lower;
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                ))));
            }
        }

        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => {
                config.logging.format = format_lower;
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                ))));
            }
        }

        if config.touch.history_size < 2 {
            return Err(CoreError::Config(ConfigError::ValidationError(format!(
                "touch.history_size must be at least 2, got {}.",
                config.touch.history_size
            ))));
        }
        if config.touch.initial_slots == 0 {
            return Err(CoreError::Config(ConfigError::ValidationError(
                "touch.initial_slots must be at least 1.".to_string(),
            )));
        }
        if config.queue.capacity == 0 {
            return Err(CoreError::Config(ConfigError::ValidationError(
                "queue.capacity must be at least 1.".to_string(),
            )));
        }

        Ok(())
    }
}
