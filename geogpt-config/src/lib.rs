//! Configuration management for GeoGPT.
//!
//! Settings come from an optional TOML file and are then overridden by
//! `GEOGPT_*` environment variables.

#![warn(missing_docs, clippy::pedantic)]

pub mod loader;
pub mod schema;

pub use loader::{LOG_FILE_VAR, LOG_FORMAT_VAR, LOG_LEVEL_VAR, WORKING_DIR_VAR};
pub use schema::{ConversionConfig, GeoGptConfig, LogFormat, LogRotation, LoggingConfig};
