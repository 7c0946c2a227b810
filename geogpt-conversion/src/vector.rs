//! File-to-file vector conversions rooted at a working directory.

use std::fs;
use std::path::{Path, PathBuf};

use geo_types::Point;
use geogpt_config::ConversionConfig;
use serde_json::Value;
use tracing::{Span, debug, info};

use crate::drivers::{CSV, Driver, GEOJSON, GPKG, KML, SHAPEFILE};
use crate::error::{ConversionError, ConversionResult, DriverContext, FormatError};
use crate::formats::csv::CsvWriteOptions;
use crate::formats::{csv, kml};
use crate::io;
use crate::table::Feature;

/// Companion files a Shapefile needs besides the `.shp` itself.
const SHAPEFILE_COMPANIONS: [&str; 3] = ["shx", "dbf", "prj"];

/// How [`VectorConv::csv_to_gpkg`] builds points from table columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPointOptions {
    /// Column holding x / longitude.
    pub x_column: String,
    /// Column holding y / latitude.
    pub y_column: String,
    /// Optional z column. It must exist when named; its values stay
    /// attributes because geometries are two-dimensional.
    pub z_column: Option<String>,
    /// CRS identifier assigned to the points.
    pub crs: String,
}

impl Default for CsvPointOptions {
    fn default() -> Self {
        Self::from(&ConversionConfig::default())
    }
}

impl From<&ConversionConfig> for CsvPointOptions {
    fn from(config: &ConversionConfig) -> Self {
        Self {
            x_column: config.x_column.clone(),
            y_column: config.y_column.clone(),
            z_column: config.z_column.clone(),
            crs: config.default_crs.clone(),
        }
    }
}

/// Converts vector files between KML/KMZ, Shapefile, GeoPackage, GeoJSON
/// and CSV.
///
/// Relative input and output paths resolve against the working directory.
/// When no output path is given, the output lands next to the input with the
/// target extension. Every conversion returns the absolute output path.
#[derive(Debug, Clone)]
pub struct VectorConv {
    working_dir: PathBuf,
    span: Span,
}

impl VectorConv {
    /// Creates a converter rooted at `working_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be made absolute.
    pub fn new(working_dir: impl AsRef<Path>) -> ConversionResult<Self> {
        let dir = working_dir.as_ref();
        let absolute = std::path::absolute(dir).driver_context("filesystem", dir)?;
        let working_dir = absolute.canonicalize().unwrap_or(absolute);
        let span = geogpt_telemetry::get_logger("geogpt.conversion.vector");
        span.in_scope(|| debug!(working_dir = %working_dir.display(), "vector converter ready"));
        Ok(Self { working_dir, span })
    }

    /// Absolute working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Converts KML, or the first KML inside a KMZ archive, to GeoPackage.
    ///
    /// The file extracted from a KMZ is deleted whether or not the
    /// conversion succeeds. The default output name follows the KMZ.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// [`FormatError::MissingArchiveMember`], or a driver failure.
    pub fn kml_to_gpkg(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        let _entered = self.span.enter();
        let source = self.resolve_input(input_file.as_ref())?;
        let output = self.resolve_output(output_file, &source, &GPKG);

        if has_extension(&source, "kmz") {
            info!(archive = %source.display(), "extracting KML from KMZ");
            let extracted = kml::extract_kml(&source)
                .driver_context("KMZ", &source)?
                .ok_or_else(|| FormatError::MissingArchiveMember {
                    archive: source.clone(),
                    extension: ".kml".to_string(),
                })?;
            return self.transcode(extracted.path(), &output, &KML, &GPKG);
        }
        self.transcode(&source, &output, &KML, &GPKG)
    }

    /// Converts GeoPackage to KML.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// or a driver failure.
    pub fn gpkg_to_kml(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        self.convert(input_file.as_ref(), output_file, &GPKG, &KML)
    }

    /// Converts a Shapefile to GeoPackage.
    ///
    /// `input_file` may name a directory, in which case the first `.shp` in
    /// name order is used. The `.shx`, `.dbf` and `.prj` companions must all
    /// be present.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::NoShapefileInDirectory`],
    /// [`FormatError::UnexpectedExtension`], [`FormatError::MissingCompanions`],
    /// or a driver failure.
    pub fn shp_to_gpkg(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        let _entered = self.span.enter();
        let mut source = self.resolve_input(input_file.as_ref())?;
        if source.is_dir() {
            source = find_shapefile(&source)?;
            debug!(shapefile = %source.display(), "using first shapefile in directory");
        }
        expect_extension(&source, &SHAPEFILE)?;

        let missing: Vec<String> = SHAPEFILE_COMPANIONS
            .iter()
            .filter(|ext| !companion_exists(&source, ext))
            .map(|ext| file_name(&source.with_extension(ext)))
            .collect();
        if !missing.is_empty() {
            return Err(FormatError::MissingCompanions {
                shapefile: source,
                missing,
            }
            .into());
        }

        let output = self.resolve_output(output_file, &source, &GPKG);
        self.transcode(&source, &output, &SHAPEFILE, &GPKG)
    }

    /// Converts GeoPackage to a Shapefile. A `.prj` is written for WGS 84.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// or a driver failure (including mixed geometry types).
    pub fn gpkg_to_shp(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        self.convert(input_file.as_ref(), output_file, &GPKG, &SHAPEFILE)
    }

    /// Converts GeoJSON to GeoPackage.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// or a driver failure.
    pub fn geojson_to_gpkg(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        self.convert(input_file.as_ref(), output_file, &GEOJSON, &GPKG)
    }

    /// Converts GeoPackage to GeoJSON.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// or a driver failure.
    pub fn gpkg_to_geojson(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        self.convert(input_file.as_ref(), output_file, &GPKG, &GEOJSON)
    }

    /// Builds point features from CSV coordinate columns and writes them to
    /// GeoPackage. Rows with an empty x or y get no geometry.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// [`FormatError::MissingColumns`], [`FormatError::InvalidCoordinate`],
    /// or a driver failure.
    pub fn csv_to_gpkg(
        &self,
        input_file: impl AsRef<Path>,
        options: &CsvPointOptions,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        let _entered = self.span.enter();
        let source = self.resolve_input(input_file.as_ref())?;
        expect_extension(&source, &CSV)?;
        let output = self.resolve_output(output_file, &source, &GPKG);
        info!(
            input = %source.display(),
            output = %output.display(),
            x = %options.x_column,
            y = %options.y_column,
            crs = %options.crs,
            "converting CSV points to GPKG"
        );

        let mut table = io::read_with(&CSV, &source)?;
        let has = |column: &str| table.columns().iter().any(|name| name == column);
        let required = [options.x_column.clone(), options.y_column.clone()];
        let missing: Vec<String> = required.iter().filter(|c| !has(c.as_str())).cloned().collect();
        if !missing.is_empty() {
            return Err(FormatError::MissingColumns {
                required: required.to_vec(),
                missing,
            }
            .into());
        }
        if let Some(z) = options.z_column.as_ref().filter(|z| !has(z.as_str())) {
            return Err(FormatError::MissingColumns {
                required: vec![z.clone()],
                missing: vec![z.clone()],
            }
            .into());
        }

        for (row, feature) in table.features_mut().iter_mut().enumerate() {
            let x = coordinate(feature, &options.x_column, row)?;
            let y = coordinate(feature, &options.y_column, row)?;
            if let Some(z) = &options.z_column {
                coordinate(feature, z, row)?;
            }
            feature.geometry = x.zip(y).map(|(x, y)| Point::new(x, y).into());
        }
        table.set_crs(Some(options.crs.clone()));

        io::write_file(&table, &output, &GPKG)?;
        finish(&output)
    }

    /// Exports GeoPackage to CSV.
    ///
    /// The CSV holds the attributes, the geometry as WKT in a `geometry`
    /// column, and the row index in a trailing `Id` column. Every field is
    /// quoted; nulls and blank strings are written as `null`.
    ///
    /// # Errors
    ///
    /// [`ConversionError::NotFound`], [`FormatError::UnexpectedExtension`],
    /// or a driver failure.
    pub fn gpkg_to_csv(
        &self,
        input_file: impl AsRef<Path>,
        output_file: Option<&Path>,
    ) -> ConversionResult<PathBuf> {
        let _entered = self.span.enter();
        let source = self.resolve_input(input_file.as_ref())?;
        expect_extension(&source, &GPKG)?;
        let output = self.resolve_output(output_file, &source, &CSV);
        info!(input = %source.display(), output = %output.display(), "converting GPKG to CSV");

        let table = io::read_with(&GPKG, &source)?;
        csv::write_with(&table, &output, &CsvWriteOptions::export())
            .driver_context(CSV.short_name, &output)?;
        finish(&output)
    }

    fn convert(
        &self,
        input_file: &Path,
        output_file: Option<&Path>,
        from: &Driver,
        to: &Driver,
    ) -> ConversionResult<PathBuf> {
        let _entered = self.span.enter();
        let source = self.resolve_input(input_file)?;
        let output = self.resolve_output(output_file, &source, to);
        self.transcode(&source, &output, from, to)
    }

    fn transcode(
        &self,
        input: &Path,
        output: &Path,
        from: &Driver,
        to: &Driver,
    ) -> ConversionResult<PathBuf> {
        expect_extension(input, from)?;
        info!(
            input = %input.display(),
            output = %output.display(),
            from = from.short_name,
            to = to.short_name,
            "converting"
        );
        let table = io::read_with(from, input)?;
        io::write_file(&table, output, to)?;
        finish(output)
    }

    fn resolve_input(&self, input: &Path) -> ConversionResult<PathBuf> {
        let path = self.working_dir.join(input);
        if !path.exists() {
            return Err(ConversionError::NotFound { path });
        }
        path.canonicalize().driver_context("filesystem", &path)
    }

    fn resolve_output(&self, output: Option<&Path>, source: &Path, to: &Driver) -> PathBuf {
        match output {
            Some(path) => self.working_dir.join(path),
            None => source.with_extension(to.extension()),
        }
    }
}

fn finish(output: &Path) -> ConversionResult<PathBuf> {
    let path = output.canonicalize().driver_context("filesystem", output)?;
    info!(output = %path.display(), "conversion finished");
    Ok(path)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Conversions accept only the driver's primary extension; `.json` is left to
/// [`crate::read_file`].
fn expect_extension(path: &Path, driver: &Driver) -> ConversionResult<()> {
    if has_extension(path, driver.extension()) {
        Ok(())
    } else {
        Err(FormatError::UnexpectedExtension {
            expected: format!(".{}", driver.extension()),
            path: path.to_path_buf(),
        }
        .into())
    }
}

fn find_shapefile(directory: &Path) -> ConversionResult<PathBuf> {
    let entries = fs::read_dir(directory).driver_context("filesystem", directory)?;
    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.driver_context("filesystem", directory)?.path();
        if path.is_file() && has_extension(&path, "shp") {
            candidates.push(path);
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| {
            FormatError::NoShapefileInDirectory {
                directory: directory.to_path_buf(),
            }
            .into()
        })
}

fn companion_exists(shapefile: &Path, extension: &str) -> bool {
    shapefile.with_extension(extension).exists()
        || shapefile
            .with_extension(extension.to_ascii_uppercase())
            .exists()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

fn coordinate(feature: &Feature, column: &str, row: usize) -> ConversionResult<Option<f64>> {
    match feature.value(column) {
        Value::Null => Ok(None),
        Value::Number(number) => Ok(number.as_f64()),
        other => Err(FormatError::InvalidCoordinate {
            column: column.to_string(),
            row,
            value: match other {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_against_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let conv = VectorConv::new(dir.path()).unwrap();
        let source = conv.working_dir().join("a.geojson");

        assert_eq!(conv.resolve_output(None, &source, &GPKG), conv.working_dir().join("a.gpkg"));
        assert_eq!(
            conv.resolve_output(Some(Path::new("out/b.gpkg")), &source, &GPKG),
            conv.working_dir().join("out/b.gpkg")
        );
        let absolute = conv.working_dir().join("c.gpkg");
        assert_eq!(conv.resolve_output(Some(absolute.as_path()), &source, &GPKG), absolute);
    }

    #[test]
    fn missing_input_reports_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let conv = VectorConv::new(dir.path()).unwrap();
        let err = conv.gpkg_to_kml("nope.gpkg", None).unwrap_err();
        match err {
            ConversionError::NotFound { path } => {
                assert!(path.is_absolute());
                assert!(path.ends_with("nope.gpkg"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn directories_without_shapefiles_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("readme.txt"), "x").unwrap();
        let conv = VectorConv::new(dir.path()).unwrap();

        let err = conv.shp_to_gpkg(".", None).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::InvalidFormat(FormatError::NoShapefileInDirectory { .. })
        ));
    }

    #[test]
    fn csv_defaults_follow_configuration() {
        let options = CsvPointOptions::default();
        assert_eq!(options.x_column, "x");
        assert_eq!(options.y_column, "y");
        assert_eq!(options.z_column, None);
        assert_eq!(options.crs, "EPSG:4326");
    }
}
