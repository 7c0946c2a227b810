//! Delimited text via the `csv` crate.

use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use geozero::ToWkt;
use serde_json::{Number, Value};

use crate::error::DriverError;
use crate::table::{Feature, FeatureTable, Properties};

/// Options for [`write_with`].
#[derive(Debug, Clone)]
pub struct CsvWriteOptions {
    /// Quote every field instead of only those that need it.
    pub quote_all: bool,
    /// Text written for missing values.
    pub null_value: String,
    /// Also write `null_value` for strings that are empty or whitespace.
    pub blank_as_null: bool,
    /// Column receiving the geometry as WKT, if any.
    pub geometry_column: Option<String>,
    /// Column receiving the zero-based row index, if any. An existing
    /// column of that name is overwritten in place; otherwise it is appended
    /// after the geometry.
    pub id_column: Option<String>,
}

impl Default for CsvWriteOptions {
    fn default() -> Self {
        Self {
            quote_all: false,
            null_value: String::new(),
            blank_as_null: false,
            geometry_column: Some("geometry".to_string()),
            id_column: None,
        }
    }
}

impl CsvWriteOptions {
    /// Layout used by the GeoPackage to CSV conversion: every field quoted,
    /// blanks and nulls written as `null`, and a trailing `Id` column.
    #[must_use]
    pub fn export() -> Self {
        Self {
            quote_all: true,
            null_value: "null".to_string(),
            blank_as_null: true,
            geometry_column: Some("geometry".to_string()),
            id_column: Some("Id".to_string()),
        }
    }
}

/// Reads a CSV file with a header row. Geometries are left empty.
pub fn read(path: &Path) -> Result<FeatureTable, DriverError> {
    let mut reader = ReaderBuilder::new().from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
    let mut table = FeatureTable::with_columns(headers.iter().cloned());

    for record in reader.records() {
        let record = record?;
        let properties: Properties = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| (header.clone(), parse_value(field)))
            .collect();
        table.push(Feature::new(None, properties));
    }
    Ok(table)
}

/// Parses a field as an integer, then a float, else keeps the text.
/// Empty fields become null.
#[must_use]
pub fn parse_value(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    if let Some(number) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    Value::String(field.to_string())
}

/// Writes the table with [`CsvWriteOptions::default`].
pub fn write(table: &FeatureTable, path: &Path) -> Result<(), DriverError> {
    write_with(table, path, &CsvWriteOptions::default())
}

/// Writes the table with explicit options.
pub fn write_with(
    table: &FeatureTable,
    path: &Path,
    options: &CsvWriteOptions,
) -> Result<(), DriverError> {
    let quote_style = if options.quote_all {
        QuoteStyle::Always
    } else {
        QuoteStyle::Necessary
    };
    let mut writer = WriterBuilder::new().quote_style(quote_style).from_path(path)?;

    let id_in_place = options
        .id_column
        .as_ref()
        .is_some_and(|id| table.columns().contains(id));
    let mut header: Vec<&str> = table.columns().iter().map(String::as_str).collect();
    if let Some(geometry) = &options.geometry_column {
        header.push(geometry);
    }
    if let Some(id) = options.id_column.as_deref().filter(|_| !id_in_place) {
        header.push(id);
    }
    writer.write_record(&header)?;

    for (index, feature) in table.features().iter().enumerate() {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        for column in table.columns() {
            if id_in_place && options.id_column.as_ref() == Some(column) {
                row.push(index.to_string());
            } else {
                row.push(format_value(feature.value(column), options));
            }
        }
        if options.geometry_column.is_some() {
            row.push(match &feature.geometry {
                Some(geometry) => geometry.to_wkt()?,
                None => options.null_value.clone(),
            });
        }
        if options.id_column.is_some() && !id_in_place {
            row.push(index.to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

fn format_value(value: &Value, options: &CsvWriteOptions) -> String {
    match value {
        Value::Null => options.null_value.clone(),
        Value::String(text) if options.blank_as_null && text.trim().is_empty() => {
            options.null_value.clone()
        }
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn parse_value_prefers_integers() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value(" -7 "), json!(-7));
        assert_eq!(parse_value("2.5"), json!(2.5));
        assert_eq!(parse_value(""), Value::Null);
        assert_eq!(parse_value("   "), Value::Null);
        assert_eq!(parse_value("Oslo"), json!("Oslo"));
        assert_eq!(parse_value("NaN"), json!("NaN"));
    }

    #[test]
    fn read_keeps_header_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        std::fs::write(&path, "name,y,x\nA,59.9,10.7\nB,,\n").unwrap();

        let table = read(&path).unwrap();
        assert_eq!(table.columns(), ["name", "y", "x"]);
        assert_eq!(table.features()[0].value("x"), &json!(10.7));
        assert_eq!(table.features()[1].value("y"), &Value::Null);
    }

    #[test]
    fn existing_id_column_is_overwritten_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut table = FeatureTable::new();
        for (id, name) in [(10, "a"), (20, " ")] {
            let properties: Properties = [
                ("Id".to_string(), json!(id)),
                ("name".to_string(), json!(name)),
            ]
            .into_iter()
            .collect();
            table.push(Feature::new(None, properties));
        }

        write_with(&table, &path, &CsvWriteOptions::export()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "\"Id\",\"name\",\"geometry\"\n\"0\",\"a\",\"null\"\n\"1\",\"null\",\"null\"\n"
        );
    }
}
