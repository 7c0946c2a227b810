//! OGC GeoPackage via `rusqlite`, with geometries encoded by `geozero`.

use std::fs;
use std::path::Path;

use geo::BoundingRect;
use geo_types::Geometry;
use geozero::wkb::GpkgWkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use serde_json::{Number, Value};

use crate::error::DriverError;
use crate::srs;
use crate::table::{ColumnKind, Feature, FeatureTable, Properties, normalize};

/// `application_id` of GeoPackage files ("GPKG").
const APPLICATION_ID: i32 = 0x4750_4B47;
/// `user_version` for GeoPackage 1.2.
const USER_VERSION: i32 = 10_200;
/// GPKG header flag marking an empty geometry.
const EMPTY_GEOMETRY_FLAG: u8 = 0b0001_0000;

const SCHEMA: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
";

/// Reads the first feature table of a GeoPackage.
pub fn read(path: &Path) -> Result<FeatureTable, DriverError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let layer: Option<(String, Option<i64>)> = conn
        .query_row(
            "SELECT table_name, srs_id FROM gpkg_contents
             WHERE data_type = 'features' ORDER BY rowid LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((layer, contents_srs)) = layer else {
        return Err(DriverError::Malformed(
            "GeoPackage contains no feature table".to_string(),
        ));
    };

    let geometry_column: Option<(String, i64)> = conn
        .query_row(
            "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&layer],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let srs_id = geometry_column.as_ref().map(|(_, id)| *id).or(contents_srs);

    let mut attributes = Vec::new();
    let mut order_by = "rowid".to_string();
    {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&layer)))?;
        let columns = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        for column in columns {
            let (name, declared, primary_key) = column?;
            if primary_key > 0 && declared.eq_ignore_ascii_case("INTEGER") {
                order_by = quote(&name);
            } else if geometry_column.as_ref().is_none_or(|(geom, _)| *geom != name) {
                let boolean = declared.eq_ignore_ascii_case("BOOLEAN");
                attributes.push((name, boolean));
            }
        }
    }

    let mut selected: Vec<String> = attributes.iter().map(|(name, _)| quote(name)).collect();
    if let Some((geom, _)) = &geometry_column {
        selected.insert(0, quote(geom));
    }
    let sql = if selected.is_empty() {
        format!("SELECT NULL FROM {} ORDER BY {order_by}", quote(&layer))
    } else {
        format!(
            "SELECT {} FROM {} ORDER BY {order_by}",
            selected.join(", "),
            quote(&layer)
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let width = stmt.column_count();
    let rows = stmt.query_map([], |row| {
        (0..width)
            .map(|index| row.get::<_, SqlValue>(index))
            .collect::<rusqlite::Result<Vec<_>>>()
    })?;

    let mut table = FeatureTable::with_columns(attributes.iter().map(|(name, _)| name.clone()));
    table.set_crs(crs_for(&conn, srs_id)?);
    for row in rows {
        let mut values = row?;
        let geometry = if geometry_column.is_some() && !values.is_empty() {
            match values.remove(0) {
                SqlValue::Blob(blob) => decode_geometry(blob)?,
                _ => None,
            }
        } else {
            None
        };
        let properties: Properties = attributes
            .iter()
            .zip(values)
            .map(|((name, boolean), value)| (name.clone(), to_json(value, *boolean)))
            .collect();
        table.push(Feature::new(geometry, properties));
    }
    Ok(table)
}

fn crs_for(conn: &Connection, srs_id: Option<i64>) -> Result<Option<String>, DriverError> {
    let Some(srs_id) = srs_id.filter(|id| *id > 0) else {
        return Ok(None);
    };
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id FROM gpkg_spatial_ref_sys
             WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(Some(match row {
        Some((organization, code)) => format!("{}:{code}", organization.to_ascii_uppercase()),
        None => format!("EPSG:{srs_id}"),
    }))
}

fn decode_geometry(blob: Vec<u8>) -> Result<Option<Geometry<f64>>, DriverError> {
    if blob.len() < 4 || blob[3] & EMPTY_GEOMETRY_FLAG != 0 {
        return Ok(None);
    }
    Ok(Some(GpkgWkb(blob).to_geo()?))
}

fn to_json(value: SqlValue, boolean: bool) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(int) if boolean => Value::Bool(int != 0),
        SqlValue::Integer(int) => Value::from(int),
        SqlValue::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        SqlValue::Text(text) => Value::String(text),
    }
}

/// Writes the table as a new GeoPackage with a single layer named after the
/// file stem. An existing file is replaced.
pub fn write(table: &FeatureTable, path: &Path) -> Result<(), DriverError> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let layer = path
        .file_stem()
        .map_or_else(|| "layer".to_string(), |stem| stem.to_string_lossy().into_owned());

    let mut conn = Connection::open(path)?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;
    conn.execute_batch(SCHEMA)?;

    let srs_id = register_srs(&conn, table)?;
    let geometry_column = unique_name("geom", table.columns());
    let kinds: Vec<ColumnKind> = table
        .columns()
        .iter()
        .map(|column| table.column_kind(column))
        .collect();

    let mut definitions = vec![
        format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", quote("fid")),
        format!("{} GEOMETRY", quote(&geometry_column)),
    ];
    let mut attribute_columns = Vec::with_capacity(table.columns().len());
    for (name, kind) in column_names(table.columns(), &geometry_column)
        .into_iter()
        .zip(&kinds)
    {
        definitions.push(format!("{} {}", quote(&name), sql_type(*kind)));
        attribute_columns.push(quote(&name));
    }

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote(&layer),
        definitions.join(", ")
    ))?;

    let bounds = table.bounds();
    tx.execute(
        "INSERT INTO gpkg_contents
            (table_name, data_type, identifier, description, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, '', ?2, ?3, ?4, ?5, ?6)",
        params![
            layer,
            bounds.map(|rect| rect.min().x),
            bounds.map(|rect| rect.min().y),
            bounds.map(|rect| rect.max().x),
            bounds.map(|rect| rect.max().y),
            srs_id,
        ],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns
            (table_name, column_name, geometry_type_name, srs_id, z, m)
         VALUES (?1, ?2, ?3, ?4, 0, 0)",
        params![layer, geometry_column, table.geometry_type_name(), srs_id],
    )?;

    {
        let mut column_list = vec![quote(&geometry_column)];
        column_list.extend(attribute_columns);
        let placeholders = (1..=column_list.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            quote(&layer),
            column_list.join(", ")
        ))?;

        for feature in table.features() {
            let mut values = Vec::with_capacity(column_list.len());
            values.push(match &feature.geometry {
                Some(geometry) => SqlValue::Blob(encode_geometry(geometry, srs_id)?),
                None => SqlValue::Null,
            });
            for (column, kind) in table.columns().iter().zip(&kinds) {
                values.push(to_sql(feature.value(column), *kind));
            }
            insert.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Ensures the table's CRS has a `gpkg_spatial_ref_sys` row and returns its id.
fn register_srs(conn: &Connection, table: &FeatureTable) -> Result<i32, DriverError> {
    match table.epsg() {
        Some(srs::WGS84) => {
            conn.execute(
                "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, ?4)",
                params![
                    "WGS 84 geodetic",
                    srs::WGS84,
                    srs::WGS84_GPKG_DEFINITION,
                    "longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid",
                ],
            )?;
            Ok(srs::WGS84)
        }
        Some(code) => {
            conn.execute(
                "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, 'undefined', NULL)",
                params![srs::epsg(code), code],
            )?;
            Ok(code)
        }
        None => {
            if let Some(crs) = table.crs() {
                tracing::warn!(crs, "CRS has no EPSG code; layer written with undefined SRS");
            }
            Ok(0)
        }
    }
}

fn encode_geometry(geometry: &Geometry<f64>, srs_id: i32) -> Result<Vec<u8>, DriverError> {
    let geometry = normalize(geometry.clone());
    let envelope = geometry
        .bounding_rect()
        .map(|rect| vec![rect.min().x, rect.max().x, rect.min().y, rect.max().y])
        .unwrap_or_default();
    Ok(geometry.to_gpkg_wkb(CoordDimensions::xy(), Some(srs_id), envelope)?)
}

fn to_sql(value: &Value, kind: ColumnKind) -> SqlValue {
    match (value, kind) {
        (Value::Null, _) => SqlValue::Null,
        (Value::Bool(flag), ColumnKind::Boolean) => SqlValue::Integer(i64::from(*flag)),
        (Value::Number(number), ColumnKind::Integer) => {
            number.as_i64().map_or(SqlValue::Null, SqlValue::Integer)
        }
        (Value::Number(number), ColumnKind::Real) => {
            number.as_f64().map_or(SqlValue::Null, SqlValue::Real)
        }
        (Value::String(text), _) => SqlValue::Text(text.clone()),
        (other, _) => SqlValue::Text(other.to_string()),
    }
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Boolean => "BOOLEAN",
        ColumnKind::Text => "TEXT",
    }
}

/// SQLite column names are case-insensitive, so attributes that differ only
/// by case (or shadow `fid` or the geometry column) get a numeric suffix.
fn column_names(columns: &[String], geometry_column: &str) -> Vec<String> {
    let mut taken = vec!["fid".to_string(), geometry_column.to_string()];
    for column in columns {
        let name = unique_name(column, &taken);
        if name != *column {
            tracing::debug!(column, renamed = %name, "attribute renamed to avoid a column clash");
        }
        taken.push(name);
    }
    taken.split_off(2)
}

fn unique_name(base: &str, taken: &[String]) -> String {
    let clashes = |candidate: &str| taken.iter().any(|name| name.eq_ignore_ascii_case(candidate));
    if !clashes(base) {
        return base.to_string();
    }
    (1..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !clashes(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    use geo_types::{point, polygon};
    use serde_json::json;

    fn sample() -> FeatureTable {
        let mut table = FeatureTable::new();
        let rows = [
            (Some(point!(x: 10.75, y: 59.91).into()), json!({ "name": "Oslo", "pop": 709_000, "capital": true })),
            (None, json!({ "name": "Nowhere", "pop": null, "capital": false })),
            (
                Some(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into()),
                json!({ "name": "Triangle", "pop": 3, "capital": null }),
            ),
        ];
        for (geometry, properties) in rows {
            let Value::Object(properties) = properties else { unreachable!() };
            table.push(Feature::new(geometry, properties));
        }
        table.set_crs(Some("EPSG:4326".into()));
        table
    }

    #[test]
    fn round_trips_geometry_attributes_and_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.gpkg");
        let table = sample();

        write(&table, &path).unwrap();
        let read_back = read(&path).unwrap();

        assert_eq!(read_back.crs(), Some("EPSG:4326"));
        assert_eq!(read_back.columns(), table.columns());
        assert_eq!(read_back.features(), table.features());
    }

    #[test]
    fn writes_geopackage_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.gpkg");
        write(&sample(), &path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let application_id: i32 = conn
            .pragma_query_value(None, "application_id", |row| row.get(0))
            .unwrap();
        assert_eq!(application_id, APPLICATION_ID);

        let (layer, min_x, max_y): (String, f64, f64) = conn
            .query_row(
                "SELECT table_name, min_x, max_y FROM gpkg_contents",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(layer, "cities");
        assert!((min_x - 0.0).abs() < f64::EPSILON);
        assert!((max_y - 59.91).abs() < f64::EPSILON);

        let geometry_type: String = conn
            .query_row("SELECT geometry_type_name FROM gpkg_geometry_columns", [], |row| row.get(0))
            .unwrap();
        assert_eq!(geometry_type, "GEOMETRY");
    }

    #[test]
    fn reading_without_feature_tables_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.gpkg");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        drop(conn);

        assert!(matches!(read(&path), Err(DriverError::Malformed(_))));
    }

    #[test]
    fn case_insensitive_attribute_clashes_are_renamed() {
        let columns = ["Name", "name", "FID", "geom", "NAME"].map(String::from);
        assert_eq!(
            column_names(&columns, "geom_1"),
            ["Name", "name_1", "FID_1", "geom", "NAME_2"]
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.gpkg");
        let mut table = FeatureTable::with_columns(["Name", "name", "fid"].map(String::from));
        let Value::Object(properties) = json!({ "Name": "A", "name": "a", "fid": 7 }) else {
            unreachable!()
        };
        table.push(Feature::new(Some(point!(x: 1.0, y: 2.0).into()), properties));
        write(&table, &path).unwrap();

        let read_back = read(&path).unwrap();
        assert_eq!(read_back.columns(), ["Name", "name_1", "fid_1"]);
        assert_eq!(read_back.features()[0].value("name_1"), &json!("a"));
        assert_eq!(read_back.features()[0].value("fid_1"), &json!(7));
    }

    #[test]
    fn unique_name_avoids_clashes() {
        let taken = vec!["geom".to_string(), "GEOM_1".to_string()];
        assert_eq!(unique_name("geom", &taken), "geom_2");
        assert_eq!(unique_name("shape", &taken), "shape");
    }
}
