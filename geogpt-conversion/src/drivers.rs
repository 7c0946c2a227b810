//! Static catalogue of the vector drivers this crate ships.

use std::path::Path;

/// Identifies a driver implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Keyhole Markup Language.
    Kml,
    /// OGC GeoPackage.
    GeoPackage,
    /// ESRI Shapefile.
    Shapefile,
    /// RFC 7946 GeoJSON.
    GeoJson,
    /// Comma separated values.
    Csv,
}

/// Catalogue entry for a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Driver {
    /// Implementation selector.
    pub kind: DriverKind,
    /// Short name, e.g. `GPKG`.
    pub short_name: &'static str,
    /// Descriptive name.
    pub long_name: &'static str,
    /// File extensions without the dot. The first one names outputs and is the
    /// only one the converters accept; the rest are recognised by `read_file`.
    pub extensions: &'static [&'static str],
}

impl Driver {
    /// Extension used for files this driver writes, e.g. `gpkg`.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.extensions[0]
    }

    /// Returns `true` if `path` carries one of this driver's extensions.
    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(ext))
            })
    }
}

/// KML driver.
pub const KML: Driver = Driver {
    kind: DriverKind::Kml,
    short_name: "KML",
    long_name: "Keyhole Markup Language (KML)",
    extensions: &["kml"],
};

/// GeoPackage driver.
pub const GPKG: Driver = Driver {
    kind: DriverKind::GeoPackage,
    short_name: "GPKG",
    long_name: "GeoPackage vector",
    extensions: &["gpkg"],
};

/// Shapefile driver.
pub const SHAPEFILE: Driver = Driver {
    kind: DriverKind::Shapefile,
    short_name: "ESRI Shapefile",
    long_name: "ESRI Shapefile",
    extensions: &["shp"],
};

/// GeoJSON driver.
pub const GEOJSON: Driver = Driver {
    kind: DriverKind::GeoJson,
    short_name: "GeoJSON",
    long_name: "GeoJSON",
    extensions: &["geojson", "json"],
};

/// CSV driver.
pub const CSV: Driver = Driver {
    kind: DriverKind::Csv,
    short_name: "CSV",
    long_name: "Comma Separated Value (.csv)",
    extensions: &["csv"],
};

/// Every driver, in catalogue order.
pub const DRIVERS: &[Driver] = &[KML, GPKG, SHAPEFILE, GEOJSON, CSV];

/// Looks a driver up by short name, ignoring case.
#[must_use]
pub fn find_driver(name: &str) -> Option<&'static Driver> {
    DRIVERS
        .iter()
        .find(|driver| driver.short_name.eq_ignore_ascii_case(name))
}

/// Picks the driver whose extensions match `path`.
#[must_use]
pub fn driver_for_path(path: &Path) -> Option<&'static Driver> {
    DRIVERS.iter().find(|driver| driver.matches(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_ignores_case() {
        assert_eq!(find_driver("gpkg").map(|d| d.kind), Some(DriverKind::GeoPackage));
        assert_eq!(find_driver("esri shapefile").map(|d| d.kind), Some(DriverKind::Shapefile));
        assert!(find_driver("GML").is_none());
    }

    #[test]
    fn lookup_by_extension() {
        assert_eq!(driver_for_path(Path::new("a/B.KML")), Some(&KML));
        assert_eq!(driver_for_path(Path::new("roads.json")), Some(&GEOJSON));
        assert!(driver_for_path(Path::new("archive.kmz")).is_none());
        assert!(driver_for_path(Path::new("no_extension")).is_none());
        assert_eq!(GEOJSON.extension(), "geojson");
    }
}
