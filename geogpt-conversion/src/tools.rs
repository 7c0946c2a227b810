//! Conversions exposed as registered GeoGPT tools.
//!
//! Every tool takes a JSON object with `input_file`, an optional
//! `output_file` and an optional `working_dir` (defaulting to the process
//! working directory), and answers `{ "output_path": "<absolute path>" }`.

use std::path::{Path, PathBuf};

use geogpt_config::ConversionConfig;
use geogpt_tools::{ToolError, ToolResult, register_function};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ConversionError, ConversionResult};
use crate::vector::{CsvPointOptions, VectorConv};

/// Tag shared by every conversion tool.
pub const CONVERSION_TAG: &str = "conversion";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConvertArgs {
    input_file: PathBuf,
    #[serde(default)]
    output_file: Option<PathBuf>,
    #[serde(default)]
    working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CsvArgs {
    input_file: PathBuf,
    #[serde(default)]
    output_file: Option<PathBuf>,
    #[serde(default)]
    working_dir: Option<PathBuf>,
    #[serde(default)]
    x_col: Option<String>,
    #[serde(default)]
    y_col: Option<String>,
    #[serde(default)]
    z_col: Option<String>,
    #[serde(default)]
    crs: Option<String>,
}

fn parse<T: DeserializeOwned>(tool: &str, input: Value) -> ToolResult<T> {
    serde_json::from_value(input).map_err(|err| ToolError::invalid_arguments(tool, err.to_string()))
}

fn converter(working_dir: Option<PathBuf>) -> ToolResult<VectorConv> {
    let dir = match working_dir {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|err| ToolError::execution(format!("cannot read working directory: {err}")))?,
    };
    VectorConv::new(dir).map_err(failure)
}

fn failure(err: ConversionError) -> ToolError {
    match err.recovery_suggestion() {
        Some(hint) => ToolError::execution(format!("{} ({hint})", err.user_message())),
        None => ToolError::execution(err.user_message()),
    }
}

fn respond(result: ConversionResult<PathBuf>) -> ToolResult<Value> {
    let path = result.map_err(failure)?;
    Ok(json!({ "output_path": path.display().to_string() }))
}

fn run<F>(tool: &str, input: Value, convert: F) -> ToolResult<Value>
where
    F: FnOnce(&VectorConv, &Path, Option<&Path>) -> ConversionResult<PathBuf>,
{
    let args: ConvertArgs = parse(tool, input)?;
    let conv = converter(args.working_dir)?;
    respond(convert(&conv, &args.input_file, args.output_file.as_deref()))
}

/// Convert a KML file, or the first KML inside a KMZ archive, to GeoPackage.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "kml", "kmz", "gpkg"]
)]
pub fn kml_to_gpkg(input: Value) -> ToolResult<Value> {
    run("kml_to_gpkg", input, |conv, input, output| conv.kml_to_gpkg(input, output))
}

/// Convert a GeoPackage to KML.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "gpkg", "kml"]
)]
pub fn gpkg_to_kml(input: Value) -> ToolResult<Value> {
    run("gpkg_to_kml", input, |conv, input, output| conv.gpkg_to_kml(input, output))
}

/// Convert a Shapefile (or the first one in a directory) to GeoPackage.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "shp", "gpkg"]
)]
pub fn shp_to_gpkg(input: Value) -> ToolResult<Value> {
    run("shp_to_gpkg", input, |conv, input, output| conv.shp_to_gpkg(input, output))
}

/// Convert a GeoPackage to a Shapefile.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "gpkg", "shp"]
)]
pub fn gpkg_to_shp(input: Value) -> ToolResult<Value> {
    run("gpkg_to_shp", input, |conv, input, output| conv.gpkg_to_shp(input, output))
}

/// Convert a GeoJSON file to GeoPackage.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "geojson", "gpkg"]
)]
pub fn geojson_to_gpkg(input: Value) -> ToolResult<Value> {
    run("geojson_to_gpkg", input, |conv, input, output| conv.geojson_to_gpkg(input, output))
}

/// Convert a GeoPackage to GeoJSON.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "gpkg", "geojson"]
)]
pub fn gpkg_to_geojson(input: Value) -> ToolResult<Value> {
    run("gpkg_to_geojson", input, |conv, input, output| conv.gpkg_to_geojson(input, output))
}

/// Build points from CSV coordinate columns and write them to GeoPackage.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir", "x_col", "y_col", "z_col", "crs"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "csv", "gpkg"]
)]
pub fn csv_to_gpkg(input: Value) -> ToolResult<Value> {
    let args: CsvArgs = parse("csv_to_gpkg", input)?;
    let defaults = CsvPointOptions::from(&ConversionConfig::default());
    let options = CsvPointOptions {
        x_column: args.x_col.unwrap_or(defaults.x_column),
        y_column: args.y_col.unwrap_or(defaults.y_column),
        z_column: args.z_col.or(defaults.z_column),
        crs: args.crs.unwrap_or(defaults.crs),
    };
    let conv = converter(args.working_dir)?;
    respond(conv.csv_to_gpkg(&args.input_file, &options, args.output_file.as_deref()))
}

/// Export a GeoPackage to CSV with WKT geometry and a row Id column.
#[register_function(
    inputs = ["input_file", "output_file", "working_dir"],
    outputs = ["output_path"],
    tags = ["conversion", "vector", "gpkg", "csv"]
)]
pub fn gpkg_to_csv(input: Value) -> ToolResult<Value> {
    run("gpkg_to_csv", input, |conv, input, output| conv.gpkg_to_csv(input, output))
}
