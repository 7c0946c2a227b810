//! Per-format readers and writers.
//!
//! Each module exposes `read(path)` and `write(table, path)` returning the
//! underlying library error; [`crate::io`] attaches driver context.

pub mod csv;
pub mod geojson;
pub mod gpkg;
pub mod kml;
pub mod shapefile;
