//! GeoJSON via the `geojson` crate.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo_types::Geometry;
use geojson::{FeatureCollection, GeoJson};
use serde_json::Value;

use crate::error::DriverError;
use crate::srs;
use crate::table::{Feature, FeatureTable, Properties, normalize};

/// Reads a FeatureCollection, a single Feature, or a bare Geometry.
///
/// GeoJSON coordinates are WGS 84 by definition, so the table CRS is always
/// `EPSG:4326`.
pub fn read(path: &Path) -> Result<FeatureTable, DriverError> {
    let document = GeoJson::from_reader(BufReader::new(File::open(path)?))?;
    let mut table = FeatureTable::new();
    match document {
        GeoJson::FeatureCollection(collection) => {
            for feature in collection.features {
                table.push(convert_feature(feature)?);
            }
        }
        GeoJson::Feature(feature) => table.push(convert_feature(feature)?),
        GeoJson::Geometry(geometry) => {
            table.push(Feature::new(Some(Geometry::try_from(geometry)?), Properties::new()));
        }
    }
    table.set_crs(Some(srs::epsg(srs::WGS84)));
    Ok(table)
}

fn convert_feature(feature: geojson::Feature) -> Result<Feature, DriverError> {
    let geometry = feature.geometry.map(Geometry::try_from).transpose()?;
    Ok(Feature::new(geometry, feature.properties.unwrap_or_default()))
}

/// Writes the table as a FeatureCollection.
pub fn write(table: &FeatureTable, path: &Path) -> Result<(), DriverError> {
    if let Some(crs) = table.crs().filter(|_| table.epsg() != Some(srs::WGS84)) {
        tracing::warn!(crs, "writing GeoJSON without reprojecting to WGS 84");
    }

    let features = table
        .features()
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: feature
                .geometry
                .clone()
                .map(|geometry| geojson::Geometry::new(geojson::Value::from(&normalize(geometry)))),
            id: None,
            properties: Some(
                table
                    .columns()
                    .iter()
                    .map(|column| (column.clone(), feature.value(column).clone()))
                    .collect::<serde_json::Map<String, Value>>(),
            ),
            foreign_members: None,
        })
        .collect();
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn reads_bare_geometry_and_single_feature() {
        let dir = tempfile::tempdir().unwrap();
        let bare = dir.path().join("bare.geojson");
        fs::write(&bare, r#"{"type":"Point","coordinates":[10.5,59.9]}"#).unwrap();
        let table = read(&bare).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.columns().is_empty());
        assert_eq!(table.crs(), Some("EPSG:4326"));

        let single = dir.path().join("single.geojson");
        fs::write(
            &single,
            r#"{"type":"Feature","geometry":null,"properties":{"name":"Oslo"}}"#,
        )
        .unwrap();
        let table = read(&single).unwrap();
        assert_eq!(table.columns(), ["name"]);
        assert!(table.features()[0].geometry.is_none());
    }

    #[test]
    fn rejects_invalid_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        fs::write(&path, r#"{"type":"Nonsense"}"#).unwrap();
        assert!(read(&path).is_err());
    }
}
