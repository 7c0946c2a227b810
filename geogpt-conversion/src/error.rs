//! Error types for vector conversions.
//!
//! Failures fall into three kinds that callers can tell apart: the input is
//! missing ([`ConversionError::NotFound`]), the input is present but unusable
//! ([`ConversionError::InvalidFormat`]), or a format library failed while
//! reading or writing ([`ConversionError::Driver`]).

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias for conversion operations.
pub type ConversionResult<T> = Result<T, ConversionError>;

/// Top-level conversion error.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The input path does not exist.
    #[error("Input file not found: {}", path.display())]
    NotFound {
        /// Absolute path that was looked up.
        path: PathBuf,
    },

    /// The input exists but does not fit the requested conversion.
    #[error(transparent)]
    InvalidFormat(#[from] FormatError),

    /// A format library failed.
    #[error("{driver} failed on '{}': {source}", path.display())]
    Driver {
        /// Short name of the driver (or `filesystem`).
        driver: &'static str,
        /// File being read or written.
        path: PathBuf,
        /// Underlying library error.
        #[source]
        source: DriverError,
    },
}

/// Structural problems with an input file.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file extension does not match the conversion.
    #[error("Expected a {expected} file, got '{}'", path.display())]
    UnexpectedExtension {
        /// Extension the conversion accepts, including the dot.
        expected: String,
        /// Offending path.
        path: PathBuf,
    },

    /// An archive does not contain a member of the expected kind.
    #[error("No {extension} file found in archive '{}'", archive.display())]
    MissingArchiveMember {
        /// Archive that was searched.
        archive: PathBuf,
        /// Member extension that was expected, including the dot.
        extension: String,
    },

    /// A directory given as Shapefile input holds no `.shp` file.
    #[error("No .shp file found in directory: {}", directory.display())]
    NoShapefileInDirectory {
        /// Directory that was searched.
        directory: PathBuf,
    },

    /// One or more Shapefile companion files are absent.
    #[error(
        "Shapefile components missing: {}. Required files: .shp, .shx, .dbf, .prj",
        missing.join(", ")
    )]
    MissingCompanions {
        /// The `.shp` file whose companions were checked.
        shapefile: PathBuf,
        /// File names of every missing companion.
        missing: Vec<String>,
    },

    /// A CSV file lacks columns the conversion needs.
    #[error(
        "CSV must contain column(s) {}; missing: {}",
        required.join(", "),
        missing.join(", ")
    )]
    MissingColumns {
        /// Columns the conversion asked for.
        required: Vec<String>,
        /// Columns that were not found.
        missing: Vec<String>,
    },

    /// A coordinate column holds a value that is not a number.
    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidCoordinate {
        /// Coordinate column name.
        column: String,
        /// Zero-based data row.
        row: usize,
        /// Offending value as written in the file.
        value: String,
    },

    /// No driver handles the file's extension.
    #[error("No driver handles '{}'", path.display())]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },
}

/// Errors raised by the format libraries, kept unchanged.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// SQLite error from the GeoPackage driver.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// GeoJSON parse or conversion error.
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
    /// JSON serialisation error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// CSV read or write error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Shapefile error.
    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),
    /// dBASE attribute table error.
    #[error(transparent)]
    Dbase(#[from] shapefile::dbase::Error),
    /// XML error from the KML driver.
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    /// Zip archive error from KMZ extraction.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    /// Geometry encoding error.
    #[error(transparent)]
    Geometry(#[from] geozero::error::GeozeroError),
    /// The file parsed but its content is not usable.
    #[error("{0}")]
    Malformed(String),
    /// The data cannot be represented in the target format.
    #[error("{0}")]
    Unsupported(String),
}

impl ConversionError {
    /// Wraps a driver failure on `path`.
    pub fn driver(driver: &'static str, path: impl Into<PathBuf>, source: impl Into<DriverError>) -> Self {
        Self::Driver {
            driver,
            path: path.into(),
            source: source.into(),
        }
    }

    /// Returns a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { path } => format!("Input file not found: {}", path.display()),
            Self::InvalidFormat(err) => err.to_string(),
            Self::Driver { driver, path, source } => {
                format!("Failed to convert '{}' ({driver}): {source}", path.display())
            }
        }
    }

    /// Returns a hint on how to fix the problem, when one applies.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } => Some(
                "Check the path, or pass working_dir so relative paths resolve correctly".to_string(),
            ),
            Self::InvalidFormat(FormatError::UnexpectedExtension { expected, .. }) => {
                Some(format!("Pass a {expected} file, or use the tool for the file's format"))
            }
            Self::InvalidFormat(FormatError::MissingCompanions { .. }) => Some(
                "Keep the .shx, .dbf and .prj files next to the .shp with the same base name"
                    .to_string(),
            ),
            Self::InvalidFormat(FormatError::MissingColumns { .. }) => {
                Some("Name the coordinate columns with x_col / y_col / z_col".to_string())
            }
            Self::InvalidFormat(_) => None,
            Self::Driver { .. } => Some("Check that the file is not corrupt or locked".to_string()),
        }
    }

    /// Returns `true` for [`ConversionError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Attaches driver context to a library result.
pub(crate) trait DriverContext<T> {
    fn driver_context(self, driver: &'static str, path: &Path) -> ConversionResult<T>;
}

impl<T, E> DriverContext<T> for Result<T, E>
where
    E: Into<DriverError>,
{
    fn driver_context(self, driver: &'static str, path: &Path) -> ConversionResult<T> {
        self.map_err(|err| ConversionError::driver(driver, path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_companions_lists_every_file() {
        let err = ConversionError::from(FormatError::MissingCompanions {
            shapefile: PathBuf::from("/data/roads.shp"),
            missing: vec!["roads.dbf".into(), "roads.prj".into()],
        });
        let message = err.user_message();
        assert!(message.contains("roads.dbf, roads.prj"), "{message}");
        assert!(err.recovery_suggestion().is_some());
        assert!(!err.is_not_found());
    }

    #[test]
    fn driver_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let result: Result<(), _> = Err(io);
        let err = result
            .driver_context("GPKG", Path::new("/data/out.gpkg"))
            .unwrap_err();

        assert!(matches!(
            &err,
            ConversionError::Driver { driver: "GPKG", source: DriverError::Io(_), .. }
        ));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("locked"));
    }

    #[test]
    fn not_found_is_distinguishable() {
        let err = ConversionError::NotFound {
            path: PathBuf::from("/missing.kml"),
        };
        assert!(err.is_not_found());
        assert_eq!(err.user_message(), "Input file not found: /missing.kml");
    }
}
