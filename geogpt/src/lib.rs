//! GeoGPT tool runtime facade.
//!
//! Depend on this crate via `cargo add geogpt`. It bundles the runtime crates
//! behind feature flags so downstream users can leave out the conversion
//! drivers, logging bootstrap or configuration loader when they only need the
//! function registry.

#![warn(missing_docs, clippy::pedantic)]

/// Function registry and `#[register_function]` (always enabled).
pub use geogpt_tools as tools;

/// Vector format conversions (enabled by `conversion` feature).
#[cfg(feature = "conversion")]
pub use geogpt_conversion as conversion;

/// Logging bootstrap (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use geogpt_telemetry as telemetry;

/// Configuration management (enabled by `config` feature).
#[cfg(feature = "config")]
pub use geogpt_config as config;

pub use geogpt_tools::{FunctionMetadata, FunctionRegistry, register_function};

/// Builds a registry holding every `#[register_function]` linked into the
/// binary, including the conversion tools when that feature is enabled.
#[must_use]
pub fn registry() -> FunctionRegistry {
    // Referencing a tool keeps the conversion crate's registrations linked.
    #[cfg(feature = "conversion")]
    let _ = std::hint::black_box(geogpt_conversion::tools::kml_to_gpkg as fn(_) -> _);
    FunctionRegistry::with_collected()
}
