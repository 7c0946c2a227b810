//! KML via `quick-xml`, and KMZ member extraction via `zip`.

use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use tempfile::NamedTempFile;
use zip::ZipArchive;

use crate::error::DriverError;
use crate::srs;
use crate::table::{Feature, FeatureTable, Properties, normalize};

/// Column holding the Placemark `<name>`.
pub const NAME_COLUMN: &str = "Name";
/// Column holding the Placemark `<description>`.
pub const DESCRIPTION_COLUMN: &str = "Description";

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, DriverError> {
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            attributes.push((key, attribute.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn text(&self) -> &str {
        self.text.trim()
    }
}

fn parse_tree(xml: &str) -> Result<Element, DriverError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack = vec![Element::default()];
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .filter(|_| !stack.is_empty())
                    .ok_or_else(|| DriverError::Malformed("unbalanced KML elements".into()))?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match stack.pop() {
        Some(root) if stack.is_empty() => Ok(root),
        _ => Err(DriverError::Malformed("unclosed KML element".into())),
    }
}

fn collect_placemarks<'a>(element: &'a Element, out: &mut Vec<&'a Element>) {
    for child in &element.children {
        if child.name == "Placemark" {
            out.push(child);
        } else {
            collect_placemarks(child, out);
        }
    }
}

/// Reads every Placemark in the document, at any folder depth.
///
/// Altitudes are dropped. The CRS is always `EPSG:4326`.
pub fn read(path: &Path) -> Result<FeatureTable, DriverError> {
    let root = parse_tree(&fs::read_to_string(path)?)?;
    let mut placemarks = Vec::new();
    collect_placemarks(&root, &mut placemarks);

    let mut table = FeatureTable::with_columns([NAME_COLUMN, DESCRIPTION_COLUMN]);
    for placemark in placemarks {
        let mut properties = Properties::new();
        for (tag, column) in [("name", NAME_COLUMN), ("description", DESCRIPTION_COLUMN)] {
            let value = placemark
                .child(tag)
                .map_or(Value::Null, |element| Value::String(element.text().to_string()));
            properties.insert(column.to_string(), value);
        }
        if let Some(extended) = placemark.child("ExtendedData") {
            read_extended_data(extended, &mut properties);
        }

        let geometry = placemark
            .children
            .iter()
            .find_map(|child| read_geometry(child).transpose())
            .transpose()?;
        table.push(Feature::new(geometry, properties));
    }
    table.set_crs(Some(srs::epsg(srs::WGS84)));
    Ok(table)
}

fn read_extended_data(extended: &Element, properties: &mut Properties) {
    for data in extended.children_named("Data") {
        if let Some(name) = data.attribute("name") {
            let value = data.child("value").map_or("", Element::text);
            properties.insert(name.to_string(), Value::String(value.to_string()));
        }
    }
    for schema_data in extended.children_named("SchemaData") {
        for simple in schema_data.children_named("SimpleData") {
            if let Some(name) = simple.attribute("name") {
                properties.insert(name.to_string(), Value::String(simple.text().to_string()));
            }
        }
    }
}

/// Returns `Ok(None)` for elements that are not geometries.
fn read_geometry(element: &Element) -> Result<Option<Geometry<f64>>, DriverError> {
    let geometry = match element.name.as_str() {
        "Point" => {
            let coords = coordinates_of(element)?;
            let coord = coords
                .first()
                .ok_or_else(|| DriverError::Malformed("Point without coordinates".into()))?;
            Geometry::Point(Point::from(*coord))
        }
        "LineString" => Geometry::LineString(LineString::new(coordinates_of(element)?)),
        "LinearRing" => Geometry::Polygon(Polygon::new(
            LineString::new(coordinates_of(element)?),
            Vec::new(),
        )),
        "Polygon" => Geometry::Polygon(read_polygon(element)?),
        "MultiGeometry" => {
            let mut parts = Vec::new();
            for child in &element.children {
                if let Some(part) = read_geometry(child)? {
                    parts.push(part);
                }
            }
            collapse(parts)
        }
        _ => return Ok(None),
    };
    Ok(Some(geometry))
}

fn read_polygon(element: &Element) -> Result<Polygon<f64>, DriverError> {
    let ring = |boundary: &Element| -> Result<Vec<LineString<f64>>, DriverError> {
        boundary
            .children_named("LinearRing")
            .map(|ring| coordinates_of(ring).map(LineString::new))
            .collect()
    };
    let exterior = element
        .child("outerBoundaryIs")
        .map(ring)
        .transpose()?
        .and_then(|rings| rings.into_iter().next())
        .ok_or_else(|| DriverError::Malformed("Polygon without outerBoundaryIs".into()))?;
    let mut interiors = Vec::new();
    for boundary in element.children_named("innerBoundaryIs") {
        interiors.extend(ring(boundary)?);
    }
    Ok(Polygon::new(exterior, interiors))
}

/// Folds MultiGeometry members into the most specific multi type.
fn collapse(parts: Vec<Geometry<f64>>) -> Geometry<f64> {
    if parts.iter().all(|part| matches!(part, Geometry::Point(_))) && !parts.is_empty() {
        let points = parts.into_iter().filter_map(|part| Point::try_from(part).ok());
        return Geometry::MultiPoint(MultiPoint::from_iter(points));
    }
    if parts.iter().all(|part| matches!(part, Geometry::LineString(_))) && !parts.is_empty() {
        let lines = parts.into_iter().filter_map(|part| LineString::try_from(part).ok());
        return Geometry::MultiLineString(MultiLineString::from_iter(lines));
    }
    if parts.iter().all(|part| matches!(part, Geometry::Polygon(_))) && !parts.is_empty() {
        let polygons = parts.into_iter().filter_map(|part| Polygon::try_from(part).ok());
        return Geometry::MultiPolygon(MultiPolygon::from_iter(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection::from_iter(parts))
}

fn coordinates_of(element: &Element) -> Result<Vec<Coord<f64>>, DriverError> {
    let text = element.child("coordinates").map_or("", Element::text);
    parse_coordinates(text)
}

/// Parses `lon,lat[,alt]` tuples separated by whitespace.
fn parse_coordinates(text: &str) -> Result<Vec<Coord<f64>>, DriverError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',').map(str::parse::<f64>);
            match (parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y))) => Ok(Coord { x, y }),
                _ => Err(DriverError::Malformed(format!("invalid KML coordinate '{tuple}'"))),
            }
        })
        .collect()
}

/// Writes a KML document with one Placemark per feature.
///
/// `Name` and `Description` columns become the Placemark name and
/// description; other columns go to `ExtendedData`.
pub fn write(table: &FeatureTable, path: &Path) -> Result<(), DriverError> {
    if let Some(crs) = table.crs().filter(|_| table.epsg() != Some(srs::WGS84)) {
        tracing::warn!(crs, "writing KML without reprojecting to WGS 84");
    }
    let layer = path
        .file_stem()
        .map_or_else(|| "layer".to_string(), |stem| stem.to_string_lossy().into_owned());

    let mut kml = String::new();
    kml.push_str("<?xml version=\"1.0\" encoding=\"utf-8\" ?>\n");
    kml.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n");
    kml.push_str("<Document id=\"root_doc\">\n");
    kml.push_str(&format!("<Folder><name>{}</name>\n", escape(layer.as_str())));

    for feature in table.features() {
        kml.push_str("  <Placemark>\n");
        let mut extended = Vec::new();
        for column in table.columns() {
            let value = feature.value(column);
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            if column.eq_ignore_ascii_case(NAME_COLUMN) {
                kml.push_str(&format!("    <name>{}</name>\n", escape(text.as_str())));
            } else if column.eq_ignore_ascii_case(DESCRIPTION_COLUMN) {
                kml.push_str(&format!(
                    "    <description>{}</description>\n",
                    escape(text.as_str())
                ));
            } else {
                extended.push((column, text));
            }
        }
        if !extended.is_empty() {
            kml.push_str("    <ExtendedData>\n");
            for (column, text) in extended {
                kml.push_str(&format!(
                    "      <Data name=\"{}\"><value>{}</value></Data>\n",
                    escape(column.as_str()),
                    escape(text.as_str())
                ));
            }
            kml.push_str("    </ExtendedData>\n");
        }
        if let Some(geometry) = &feature.geometry {
            kml.push_str("    ");
            write_geometry(&mut kml, &normalize(geometry.clone()));
            kml.push('\n');
        }
        kml.push_str("  </Placemark>\n");
    }
    kml.push_str("</Folder>\n</Document>\n</kml>\n");

    let mut file = File::create(path)?;
    file.write_all(kml.as_bytes())?;
    Ok(())
}

fn write_geometry(out: &mut String, geometry: &Geometry<f64>) {
    match geometry {
        Geometry::Point(point) => {
            out.push_str("<Point>");
            write_coordinates(out, std::iter::once(point.0));
            out.push_str("</Point>");
        }
        Geometry::LineString(line) => {
            out.push_str("<LineString>");
            write_coordinates(out, line.coords().copied());
            out.push_str("</LineString>");
        }
        Geometry::Polygon(polygon) => write_polygon(out, polygon),
        Geometry::MultiPoint(points) => {
            write_multi(out, points.iter().map(|point| Geometry::Point(*point)));
        }
        Geometry::MultiLineString(lines) => {
            write_multi(out, lines.iter().cloned().map(Geometry::LineString));
        }
        Geometry::MultiPolygon(polygons) => {
            write_multi(out, polygons.iter().cloned().map(Geometry::Polygon));
        }
        Geometry::GeometryCollection(collection) => write_multi(out, collection.iter().cloned()),
        other => write_geometry(out, &normalize(other.clone())),
    }
}

fn write_multi(out: &mut String, parts: impl Iterator<Item = Geometry<f64>>) {
    out.push_str("<MultiGeometry>");
    for part in parts {
        write_geometry(out, &part);
    }
    out.push_str("</MultiGeometry>");
}

fn write_polygon(out: &mut String, polygon: &Polygon<f64>) {
    out.push_str("<Polygon><outerBoundaryIs><LinearRing>");
    write_coordinates(out, polygon.exterior().coords().copied());
    out.push_str("</LinearRing></outerBoundaryIs>");
    for interior in polygon.interiors() {
        out.push_str("<innerBoundaryIs><LinearRing>");
        write_coordinates(out, interior.coords().copied());
        out.push_str("</LinearRing></innerBoundaryIs>");
    }
    out.push_str("</Polygon>");
}

fn write_coordinates(out: &mut String, coords: impl Iterator<Item = Coord<f64>>) {
    out.push_str("<coordinates>");
    for (index, coord) in coords.enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{},{}", coord.x, coord.y));
    }
    out.push_str("</coordinates>");
}

/// The KML member of a KMZ archive, extracted next to the archive.
///
/// The file is deleted when this value is dropped.
#[derive(Debug)]
pub struct ExtractedKml {
    file: NamedTempFile,
}

impl ExtractedKml {
    /// Path of the extracted `.kml` file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for ExtractedKml {
    fn drop(&mut self) {
        tracing::info!(path = %self.file.path().display(), "deleting extracted KML");
    }
}

/// Extracts the first `.kml` member of `archive` into a temporary file in
/// the archive's directory. Returns `None` when the archive has no such
/// member.
pub fn extract_kml(archive: &Path) -> Result<Option<ExtractedKml>, DriverError> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let member = zip
        .file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".kml"))
        .map(str::to_owned);
    let Some(member) = member else {
        return Ok(None);
    };

    let directory = archive
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut file = tempfile::Builder::new()
        .prefix(".kmz-extract-")
        .suffix(".kml")
        .tempfile_in(directory)?;

    let mut entry = zip.by_name(&member)?;
    io::copy(&mut entry, file.as_file_mut())?;
    file.as_file_mut().flush()?;
    tracing::debug!(member, path = %file.path().display(), "extracted KML from KMZ");
    Ok(Some(ExtractedKml { file }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use geo_types::{point, polygon};

    const DOCUMENT: &str = r##"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Folder>
      <Placemark>
        <name>Fjord &amp; harbour</name>
        <description><![CDATA[<b>deep</b>]]></description>
        <ExtendedData>
          <Data name="depth"><value>1308</value></Data>
          <SchemaData schemaUrl="#s"><SimpleData name="region">Vestland</SimpleData></SchemaData>
        </ExtendedData>
        <Point><coordinates>6.5,61.1,0</coordinates></Point>
      </Placemark>
    </Folder>
    <Placemark>
      <Polygon>
        <outerBoundaryIs><LinearRing><coordinates>
          0,0 4,0 4,4 0,4 0,0
        </coordinates></LinearRing></outerBoundaryIs>
        <innerBoundaryIs><LinearRing><coordinates>1,1 2,1 2,2 1,1</coordinates></LinearRing></innerBoundaryIs>
      </Polygon>
    </Placemark>
    <Placemark>
      <MultiGeometry>
        <Point><coordinates>1,2</coordinates></Point>
        <Point><coordinates>3,4</coordinates></Point>
      </MultiGeometry>
    </Placemark>
  </Document>
</kml>"##;

    #[test]
    fn reads_nested_placemarks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.kml");
        fs::write(&path, DOCUMENT).unwrap();

        let table = read(&path).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns(), ["Name", "Description", "depth", "region"]);
        assert_eq!(table.crs(), Some("EPSG:4326"));

        let fjord = &table.features()[0];
        assert_eq!(fjord.value("Name"), "Fjord & harbour");
        assert_eq!(fjord.value("Description"), "<b>deep</b>");
        assert_eq!(fjord.value("depth"), "1308");
        assert_eq!(fjord.value("region"), "Vestland");
        assert_eq!(fjord.geometry, Some(point!(x: 6.5, y: 61.1).into()));

        match &table.features()[1].geometry {
            Some(Geometry::Polygon(polygon)) => assert_eq!(polygon.interiors().len(), 1),
            other => panic!("expected polygon, got {other:?}"),
        }
        assert!(matches!(table.features()[2].geometry, Some(Geometry::MultiPoint(_))));
        assert_eq!(table.features()[2].value("Name"), &Value::Null);
    }

    #[test]
    fn written_documents_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.kml");
        let mut table = FeatureTable::new();
        let mut properties = Properties::new();
        properties.insert("Name".into(), Value::String("<Lake>".into()));
        properties.insert("area".into(), Value::from(12));
        table.push(Feature::new(
            Some(polygon![(x: 0.0, y: 0.0), (x: 1.5, y: 0.0), (x: 1.5, y: 1.5)].into()),
            properties,
        ));

        write(&table, &path).unwrap();
        let read_back = read(&path).unwrap();
        let feature = &read_back.features()[0];
        assert_eq!(feature.value("Name"), "<Lake>");
        assert_eq!(feature.value("area"), "12");
        assert_eq!(feature.geometry, table.features()[0].geometry);
    }

    #[test]
    fn rejects_bad_coordinates() {
        assert!(parse_coordinates("1,2 3").is_err());
        assert_eq!(parse_coordinates("1,2,3 4,5").unwrap().len(), 2);
    }

    #[test]
    fn extraction_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("doc.kmz");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("files/readme.txt", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"not kml").unwrap();
        writer
            .start_file("doc.kml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(DOCUMENT.as_bytes()).unwrap();
        writer.finish().unwrap();

        let extracted = extract_kml(&archive).unwrap().expect("kml member");
        let path = extracted.path().to_path_buf();
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(read(&path).unwrap().len(), 3);

        drop(extracted);
        assert!(!path.exists());
    }

    #[test]
    fn archives_without_kml_yield_none() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.kmz");
        let mut writer = zip::ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("image.png", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"png").unwrap();
        writer.finish().unwrap();

        assert!(extract_kml(&archive).unwrap().is_none());
    }
}
