//! # xitouch Core Library (`xitouch-core`)
//!
//! `xitouch-core` is the foundation shared by the xitouch crates. It carries the
//! pieces every component needs but none of them owns:
//!
//! - **Error Handling**: [`CoreError`] and the more specific [`ConfigError`] and
//!   [`LoggingError`].
//! - **Configuration Management**: the [`CoreConfig`] schema (logging, touch
//!   bookkeeping limits, dispatch queue sizing), its defaults, and the
//!   [`ConfigLoader`] that reads and validates it from TOML.
//! - **Logging**: initialisation of the global `tracing` subscriber, either a
//!   minimal stderr logger or the configured stdout/file layers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xitouch_core::config::ConfigLoader;
//! use xitouch_core::logging::init_logging;
//! use xitouch_core::error::CoreError;
//!
//! fn main() -> Result<(), CoreError> {
//!     let config = ConfigLoader::load()?;
//!     init_logging(&config.logging, false)?;
//!     tracing::info!("xitouch core initialized");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod config;
pub mod logging;

pub use error::{CoreError, ConfigError, LoggingError};
pub use config::{ConfigLoader, CoreConfig, LoggingConfig, QueueConfig, TouchConfig};
pub use logging::{init_logging, init_minimal_logging};
