//! Configuration management for xitouch.
//!
//! - [`types`]: the schema ([`CoreConfig`], [`LoggingConfig`], [`TouchConfig`],
//!   [`QueueConfig`]).
//! - [`defaults`]: default values referenced by the `serde` attributes.
//! - [`loader`]: [`ConfigLoader`], which reads TOML and validates the result.
//!
//! A missing `XITOUCH_CONFIG` file location yields the defaults; a present but
//! broken file is an error. Validation normalises log level and format to
//! lowercase and checks numeric bounds.

pub mod defaults;
pub mod types;
pub mod loader;

pub use types::{CoreConfig, LoggingConfig, QueueConfig, TouchConfig};
pub use loader::ConfigLoader;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults as config_defaults;

    #[test]
    fn test_core_config_default() {
        let config = CoreConfig::default();
        assert_eq!(config.logging.level, config_defaults::default_log_level());
        assert_eq!(config.touch.history_size, config_defaults::default_history_size());
        assert_eq!(config.touch.initial_slots, config_defaults::default_initial_slots());
        assert_eq!(config.queue.capacity, config_defaults::default_queue_capacity());
    }

    #[test]
    fn test_core_config_deserialize_minimal() {
        let json_data = r#"{ "touch": { "history_size": 16 } }"#;
        let config: CoreConfig = serde_json::from_str(json_data).expect("Failed to deserialize CoreConfig");
        assert_eq!(config.touch.history_size, 16);
        assert_eq!(config.touch.initial_slots, config_defaults::default_initial_slots());
        assert_eq!(config.logging.format, config_defaults::default_log_format());
    }
}
