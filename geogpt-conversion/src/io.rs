//! Format-dispatching read and write entry points.

use std::path::Path;

use crate::drivers::{self, Driver, DriverKind};
use crate::error::{ConversionResult, DriverContext, FormatError};
use crate::formats;
use crate::table::FeatureTable;

/// Reads `path` with the driver matching its extension.
///
/// # Errors
///
/// [`FormatError::UnsupportedFormat`] when no driver matches, otherwise the
/// driver's own failure.
pub fn read_file(path: &Path) -> ConversionResult<FeatureTable> {
    let driver = drivers::driver_for_path(path).ok_or_else(|| FormatError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    read_with(driver, path)
}

/// Reads `path` with an explicit driver.
///
/// # Errors
///
/// Returns [`ConversionError::Driver`](crate::ConversionError::Driver) when
/// the format library fails.
pub fn read_with(driver: &Driver, path: &Path) -> ConversionResult<FeatureTable> {
    let table = match driver.kind {
        DriverKind::Kml => formats::kml::read(path),
        DriverKind::GeoPackage => formats::gpkg::read(path),
        DriverKind::Shapefile => formats::shapefile::read(path),
        DriverKind::GeoJson => formats::geojson::read(path),
        DriverKind::Csv => formats::csv::read(path),
    }
    .driver_context(driver.short_name, path)?;
    tracing::debug!(
        driver = driver.short_name,
        path = %path.display(),
        features = table.len(),
        "read layer"
    );
    Ok(table)
}

/// Writes `table` to `path` with `driver`, replacing any existing file.
///
/// # Errors
///
/// Returns [`ConversionError::Driver`](crate::ConversionError::Driver) when
/// the format library fails.
pub fn write_file(table: &FeatureTable, path: &Path, driver: &Driver) -> ConversionResult<()> {
    match driver.kind {
        DriverKind::Kml => formats::kml::write(table, path),
        DriverKind::GeoPackage => formats::gpkg::write(table, path),
        DriverKind::Shapefile => formats::shapefile::write(table, path),
        DriverKind::GeoJson => formats::geojson::write(table, path),
        DriverKind::Csv => formats::csv::write(table, path),
    }
    .driver_context(driver.short_name, path)?;
    tracing::debug!(
        driver = driver.short_name,
        path = %path.display(),
        features = table.len(),
        "wrote layer"
    );
    Ok(())
}
