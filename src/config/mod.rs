//! Configuration Module
//!
//! Layered runtime configuration: built-in defaults, then an optional TOML
//! config file, then CLI and environment overrides. The result is a frozen
//! [`Settings`] value validated once before the server starts; every
//! validation failure is fatal with exit code 1.

pub mod settings;

// Re-export commonly used types
pub use settings::{ConfigError, PartialSettings, Settings};
