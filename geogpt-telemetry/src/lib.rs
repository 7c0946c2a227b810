//! Observability utilities for GeoGPT.
//!
//! Logging is bootstrapped once per process through
//! [`tracing_support::initialize`]; components obtain a handle with
//! [`tracing_support::get_logger`], which initialises with defaults on first
//! use.

#![warn(missing_docs, clippy::pedantic)]

pub mod tracing_support;

pub use tracing_support::{LoggingGuard, TelemetryError, TelemetryResult, get_logger, initialize};
