//! In-memory feature table shared by every driver.

use geo::BoundingRect;
use geo_types::{Geometry, Rect};
use serde_json::{Map, Value};

use crate::srs;

/// Attribute values of one feature, keyed by column name.
pub type Properties = Map<String, Value>;

/// A single row: optional geometry plus attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    /// Geometry, or `None` for a row without one.
    pub geometry: Option<Geometry<f64>>,
    /// Attribute values.
    pub properties: Properties,
}

impl Feature {
    /// Creates a feature.
    #[must_use]
    pub fn new(geometry: Option<Geometry<f64>>, properties: Properties) -> Self {
        Self {
            geometry,
            properties,
        }
    }

    /// Returns the value of `column`, or `Null` when absent.
    #[must_use]
    pub fn value(&self, column: &str) -> &Value {
        self.properties.get(column).unwrap_or(&Value::Null)
    }
}

/// Storage class inferred for an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every non-null value is an integer.
    Integer,
    /// Every non-null value is a number.
    Real,
    /// Every non-null value is a boolean.
    Boolean,
    /// Anything else, including all-null columns.
    Text,
}

/// Ordered attribute columns, features, and the layer CRS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    features: Vec<Feature>,
    crs: Option<String>,
}

impl FeatureTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with a fixed column order.
    #[must_use]
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for column in columns {
            table.add_column(column);
        }
        table
    }

    /// Attribute column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Features in order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Mutable access to the features.
    pub fn features_mut(&mut self) -> &mut [Feature] {
        &mut self.features
    }

    /// CRS identifier, if known.
    #[must_use]
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Sets the CRS identifier.
    pub fn set_crs(&mut self, crs: Option<String>) {
        self.crs = crs;
    }

    /// EPSG code of the CRS, if it has one.
    #[must_use]
    pub fn epsg(&self) -> Option<i32> {
        self.crs.as_deref().and_then(srs::parse_epsg)
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` when the table holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Appends a column unless it already exists.
    pub fn add_column(&mut self, column: impl Into<String>) {
        let column = column.into();
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    /// Appends a feature; unseen property names become new columns.
    pub fn push(&mut self, feature: Feature) {
        for key in feature.properties.keys() {
            if !self.columns.iter().any(|column| column == key) {
                self.columns.push(key.clone());
            }
        }
        self.features.push(feature);
    }

    /// Infers how `column` should be stored by typed formats.
    #[must_use]
    pub fn column_kind(&self, column: &str) -> ColumnKind {
        let mut kind: Option<ColumnKind> = None;
        for value in self.features.iter().map(|feature| feature.value(column)) {
            let value_kind = match value {
                Value::Null => continue,
                Value::Bool(_) => ColumnKind::Boolean,
                Value::Number(n) if n.is_i64() => ColumnKind::Integer,
                Value::Number(_) => ColumnKind::Real,
                _ => return ColumnKind::Text,
            };
            kind = Some(match (kind, value_kind) {
                (None, next) => next,
                (Some(current), next) if current == next => current,
                (Some(ColumnKind::Integer | ColumnKind::Real), ColumnKind::Integer | ColumnKind::Real) => {
                    ColumnKind::Real
                }
                _ => return ColumnKind::Text,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }

    /// Bounding box of every geometry in the table.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref()?.bounding_rect())
            .reduce(|acc, rect| {
                Rect::new(
                    (acc.min().x.min(rect.min().x), acc.min().y.min(rect.min().y)),
                    (acc.max().x.max(rect.max().x), acc.max().y.max(rect.max().y)),
                )
            })
    }

    /// Geometry type shared by every feature, or `GEOMETRY` when mixed.
    #[must_use]
    pub fn geometry_type_name(&self) -> &'static str {
        let mut names = self
            .features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref())
            .map(geometry_type_name);
        match names.next() {
            Some(first) if names.all(|name| name == first) => first,
            _ => "GEOMETRY",
        }
    }
}

/// Rewrites the shape-only variants (`Line`, `Rect`, `Triangle`) as the
/// simple-feature types file formats understand.
#[must_use]
pub fn normalize(geometry: Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Line(line) => Geometry::LineString(line.into()),
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(triangle) => Geometry::Polygon(triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(
            collection.into_iter().map(normalize).collect(),
        ),
        other => other,
    }
}

/// Simple-feature type name of a geometry.
#[must_use]
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "POINT",
        Geometry::Line(_) | Geometry::LineString(_) => "LINESTRING",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "POLYGON",
        Geometry::MultiPoint(_) => "MULTIPOINT",
        Geometry::MultiLineString(_) => "MULTILINESTRING",
        Geometry::MultiPolygon(_) => "MULTIPOLYGON",
        Geometry::GeometryCollection(_) => "GEOMETRYCOLLECTION",
    }
}
