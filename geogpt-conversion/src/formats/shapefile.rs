//! ESRI Shapefile via the `shapefile` crate and its `dbase` re-export.

use std::fs;
use std::path::Path;

use geo_types::Geometry;
use serde_json::{Number, Value};
use shapefile::dbase::{self, FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Multipoint, Point, Polygon, Polyline, Shape};

use crate::error::DriverError;
use crate::srs;
use crate::table::{ColumnKind, Feature, FeatureTable, Properties, normalize};

/// dBASE field names are limited to 10 bytes.
const MAX_FIELD_NAME: usize = 10;
/// dBASE character fields are limited to 254 bytes.
const MAX_CHARACTER_LENGTH: usize = 254;

/// Reads shapes and attribute records. The `.prj` companion, when present,
/// provides the CRS.
pub fn read(path: &Path) -> Result<FeatureTable, DriverError> {
    let dbf = dbase::Reader::from_path(path.with_extension("dbf"))?;
    let columns: Vec<String> = dbf
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect();
    drop(dbf);

    let mut table = FeatureTable::with_columns(columns.iter().cloned());
    let mut reader = shapefile::Reader::from_path(path)?;
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item?;
        let geometry = match shape {
            Shape::NullShape => None,
            shape => Some(Geometry::<f64>::try_from(shape).map_err(|err| {
                DriverError::Unsupported(format!("unsupported shape: {err:?}"))
            })?),
        };
        let properties: Properties = columns
            .iter()
            .map(|name| (name.clone(), record.get(name).map_or(Value::Null, field_to_json)))
            .collect();
        table.push(Feature::new(geometry, properties));
    }

    let prj = path.with_extension("prj");
    if prj.exists() {
        table.set_crs(srs::from_prj(&fs::read_to_string(prj)?));
    }
    Ok(table)
}

fn field_to_json(value: &FieldValue) -> Value {
    let number = |n: f64| {
        // Numeric fields store integers as whole floats.
        if n.fract() == 0.0 && n.abs() < 9.0e15 {
            #[allow(clippy::cast_possible_truncation)]
            Value::from(n as i64)
        } else {
            Number::from_f64(n).map_or(Value::Null, Value::Number)
        }
    };
    match value {
        FieldValue::Character(text) => text.clone().map_or(Value::Null, Value::String),
        FieldValue::Memo(text) => Value::String(text.clone()),
        FieldValue::Numeric(n) => n.map_or(Value::Null, number),
        FieldValue::Float(n) => n.map_or(Value::Null, |n| number(f64::from(n))),
        FieldValue::Double(n) | FieldValue::Currency(n) => number(*n),
        FieldValue::Integer(n) => Value::from(*n),
        FieldValue::Logical(flag) => flag.map_or(Value::Null, Value::Bool),
        other => Value::String(format!("{other:?}")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShapeKind {
    Point,
    Multipoint,
    Polyline,
    Polygon,
}

impl ShapeKind {
    fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) => Some(Self::Point),
            Geometry::MultiPoint(_) => Some(Self::Multipoint),
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(Self::Polyline),
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Some(Self::Polygon),
            _ => None,
        }
    }
}

struct Field {
    column: String,
    name: String,
    kind: ColumnKind,
}

/// Writes `.shp`, `.shx` and `.dbf`, plus a `.prj` when the CRS is WGS 84.
///
/// A Shapefile holds one shape type; it is taken from the first geometry and
/// any other type is rejected. Features without geometry are skipped.
pub fn write(table: &FeatureTable, path: &Path) -> Result<(), DriverError> {
    let geometries: Vec<Option<Geometry<f64>>> = table
        .features()
        .iter()
        .map(|feature| feature.geometry.clone().map(normalize))
        .collect();
    let first = geometries
        .iter()
        .flatten()
        .next()
        .ok_or_else(|| DriverError::Unsupported("Shapefile output needs at least one geometry".into()))?;
    let kind = ShapeKind::of(first).ok_or_else(|| {
        DriverError::Unsupported("geometry collections cannot be written to a Shapefile".into())
    })?;

    let fields = plan_fields(table);
    let mut builder = TableWriterBuilder::new();
    for field in &fields {
        let name = FieldName::try_from(field.name.as_str()).map_err(|err| {
            DriverError::Unsupported(format!("invalid field name '{}': {err:?}", field.name))
        })?;
        builder = match field.kind {
            ColumnKind::Integer => builder.add_numeric_field(name, 18, 0),
            ColumnKind::Real => builder.add_numeric_field(name, 24, 15),
            ColumnKind::Boolean => builder.add_logical_field(name),
            ColumnKind::Text => {
                #[allow(clippy::cast_possible_truncation)]
                builder.add_character_field(name, MAX_CHARACTER_LENGTH as u8)
            }
        };
    }

    {
        let mut writer = shapefile::Writer::from_path(path, builder)?;
        let mut skipped = 0_usize;
        for (feature, geometry) in table.features().iter().zip(geometries) {
            let Some(geometry) = geometry else {
                skipped += 1;
                continue;
            };
            let record = to_record(feature, &fields);
            match (kind, geometry) {
                (ShapeKind::Point, Geometry::Point(point)) => {
                    writer.write_shape_and_record(&Point::from(point), &record)?;
                }
                (ShapeKind::Multipoint, Geometry::MultiPoint(points)) => {
                    writer.write_shape_and_record(&Multipoint::from(points), &record)?;
                }
                (ShapeKind::Polyline, Geometry::LineString(line)) => {
                    writer.write_shape_and_record(&Polyline::from(line), &record)?;
                }
                (ShapeKind::Polyline, Geometry::MultiLineString(lines)) => {
                    writer.write_shape_and_record(&Polyline::from(lines), &record)?;
                }
                (ShapeKind::Polygon, Geometry::Polygon(polygon)) => {
                    writer.write_shape_and_record(&Polygon::from(polygon), &record)?;
                }
                (ShapeKind::Polygon, Geometry::MultiPolygon(polygons)) => {
                    writer.write_shape_and_record(&Polygon::from(polygons), &record)?;
                }
                (_, other) => {
                    return Err(DriverError::Unsupported(format!(
                        "a {kind:?} Shapefile cannot hold a {} geometry",
                        crate::table::geometry_type_name(&other)
                    )));
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(skipped, "features without geometry are not written to Shapefiles");
        }
    }

    match table.epsg() {
        Some(srs::WGS84) => fs::write(path.with_extension("prj"), srs::WGS84_ESRI_PRJ)?,
        _ => {
            if let Some(crs) = table.crs() {
                if crs.starts_with("GEOGCS[") || crs.starts_with("PROJCS[") {
                    fs::write(path.with_extension("prj"), crs)?;
                } else {
                    tracing::warn!(crs, "no .prj written for this CRS");
                }
            }
        }
    }
    Ok(())
}

/// Assigns each column a unique dBASE field name of at most 10 bytes.
fn plan_fields(table: &FeatureTable) -> Vec<Field> {
    let mut used: Vec<String> = Vec::new();
    let mut fields = Vec::with_capacity(table.columns().len());
    for column in table.columns() {
        let base = truncate(column, MAX_FIELD_NAME);
        let mut candidate = base.clone();
        let mut suffix = 1;
        while used.iter().any(|name| name.eq_ignore_ascii_case(&candidate)) {
            let tail = suffix.to_string();
            candidate = format!("{}{tail}", truncate(&base, MAX_FIELD_NAME - tail.len()));
            suffix += 1;
        }
        if candidate != *column {
            tracing::debug!(column, field = %candidate, "renamed attribute for dBASE");
        }
        used.push(candidate.clone());
        fields.push(Field {
            column: column.clone(),
            name: candidate,
            kind: table.column_kind(column),
        });
    }
    fields
}

fn to_record(feature: &Feature, fields: &[Field]) -> Record {
    let mut record = Record::default();
    for field in fields {
        let value = feature.value(&field.column);
        let field_value = match field.kind {
            ColumnKind::Integer | ColumnKind::Real => FieldValue::Numeric(value.as_f64()),
            ColumnKind::Boolean => FieldValue::Logical(value.as_bool()),
            ColumnKind::Text => FieldValue::Character(match value {
                Value::Null => None,
                Value::String(text) => Some(truncate(text, MAX_CHARACTER_LENGTH)),
                other => Some(truncate(&other.to_string(), MAX_CHARACTER_LENGTH)),
            }),
        };
        record.insert(field.name.clone(), field_value);
    }
    record
}

/// Cuts `text` to at most `max` bytes on a character boundary.
fn truncate(text: &str, max: usize) -> String {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use geo_types::{line_string, point};
    use serde_json::json;

    fn table_of(rows: Vec<(Geometry<f64>, Value)>) -> FeatureTable {
        let mut table = FeatureTable::new();
        for (geometry, properties) in rows {
            let Value::Object(properties) = properties else { unreachable!() };
            table.push(Feature::new(Some(geometry), properties));
        }
        table.set_crs(Some("EPSG:4326".into()));
        table
    }

    #[test]
    fn round_trips_points_with_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wells.shp");
        let table = table_of(vec![
            (point!(x: 5.3, y: 60.4).into(), json!({ "name": "Bergen", "depth": 120, "active": true })),
            (point!(x: 10.4, y: 63.4).into(), json!({ "name": "Trondheim", "depth": 85, "active": false })),
        ]);

        write(&table, &path).unwrap();
        for companion in ["shx", "dbf", "prj"] {
            assert!(path.with_extension(companion).exists(), "{companion}");
        }

        let read_back = read(&path).unwrap();
        assert_eq!(read_back.crs(), Some("EPSG:4326"));
        assert_eq!(read_back.len(), 2);
        let first = &read_back.features()[0];
        assert_eq!(first.geometry, Some(point!(x: 5.3, y: 60.4).into()));
        assert_eq!(first.value("name"), &json!("Bergen"));
        assert_eq!(first.value("depth"), &json!(120));
        assert_eq!(first.value("active"), &json!(true));
    }

    #[test]
    fn rejects_mixed_shape_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.shp");
        let table = table_of(vec![
            (point!(x: 0.0, y: 0.0).into(), json!({})),
            (line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into(), json!({})),
        ]);

        assert!(matches!(write(&table, &path), Err(DriverError::Unsupported(_))));
    }

    #[test]
    fn long_field_names_are_truncated_uniquely() {
        let table = table_of(vec![(
            point!(x: 0.0, y: 0.0).into(),
            json!({ "population_2020": 1, "population_2021": 2 }),
        )]);
        let fields = plan_fields(&table);
        let names: Vec<&str> = fields.iter().map(|field| field.name.as_str()).collect();
        assert_eq!(names, ["population", "populatio1"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("blåbærsyltetøy", 4), "blå");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
