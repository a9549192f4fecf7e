//! Default configuration values.
//!
//! Used by `serde`'s `default` attribute so that a partial (or empty)
//! configuration file still yields a complete [`CoreConfig`](super::CoreConfig).

use super::{LoggingConfig, QueueConfig, TouchConfig};
use std::path::PathBuf;

pub(crate) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}

pub(crate) fn default_log_file_path() -> Option<PathBuf> {
    None
}

pub(crate) fn default_log_format() -> String {
    "text".to_string()
}

pub(crate) fn default_touch_config() -> TouchConfig {
    TouchConfig {
        history_size: default_history_size(),
        initial_slots: default_initial_slots(),
    }
}

/// Bound of the per-touch replay log. Matches the X server's `TOUCH_HISTORY_SIZE`.
pub(crate) fn default_history_size() -> usize {
    100
}

pub(crate) fn default_initial_slots() -> usize {
    5
}

pub(crate) fn default_queue_config() -> QueueConfig {
    QueueConfig {
        capacity: default_queue_capacity(),
    }
}

pub(crate) fn default_queue_capacity() -> usize {
    256
}
