//! Vector file conversions for GeoGPT.
//!
//! [`VectorConv`] converts between KML/KMZ, ESRI Shapefile, GeoPackage,
//! GeoJSON and CSV through an in-memory [`FeatureTable`]. Each conversion is
//! also registered as a GeoGPT tool (see [`tools`]) so that it can be found in
//! a [`FunctionRegistry`](geogpt_tools::FunctionRegistry) under the
//! `conversion` tag.

#![warn(missing_docs, clippy::pedantic)]

pub mod drivers;
pub mod error;
pub mod formats;
pub mod io;
pub mod srs;
pub mod table;
pub mod tools;
pub mod vector;

pub use drivers::{DRIVERS, Driver, DriverKind, driver_for_path, find_driver};
pub use error::{ConversionError, ConversionResult, DriverError, FormatError};
pub use io::{read_file, write_file};
pub use table::{ColumnKind, Feature, FeatureTable, Properties};
pub use vector::{CsvPointOptions, VectorConv};
