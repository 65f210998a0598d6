use chrono::{DateTime, Utc};
use geo::BoundingRect;
use geo_types::{Coord, Geometry, Rect};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Capabilities supported by a tile provider
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Capability {
    /// Streams features for a tile grid cell
    Tiles,
    /// Streams features for arbitrary bounds with property filtering
    Filter,
    /// Reports per-layer modification tags for cache versioning
    ModificationTag,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Tiles => write!(f, "tiles"),
            Capability::Filter => write!(f, "filter"),
            Capability::ModificationTag => write!(f, "modification-tag"),
        }
    }
}

/// Geometry variant of a layer or feature
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// Geometry type of a decoded value. Lines and rectangles are reported
    /// as their line string and polygon equivalents.
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            }
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }
}

impl fmt::Display for GeometryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryType::Point => write!(f, "Point"),
            GeometryType::LineString => write!(f, "LineString"),
            GeometryType::Polygon => write!(f, "Polygon"),
            GeometryType::MultiPoint => write!(f, "MultiPoint"),
            GeometryType::MultiLineString => write!(f, "MultiLineString"),
            GeometryType::MultiPolygon => write!(f, "MultiPolygon"),
            GeometryType::GeometryCollection => write!(f, "GeometryCollection"),
        }
    }
}

/// Backend-assigned feature identifier
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureId {
    Number(u64),
    Text(String),
}

impl FeatureId {
    /// Parse a textual id, preferring the numeric form
    pub fn parse(value: &str) -> Self {
        match value.parse::<u64>() {
            Ok(n) => FeatureId::Number(n),
            Err(_) => FeatureId::Text(value.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            FeatureId::Number(n) => Some(*n),
            FeatureId::Text(_) => None,
        }
    }
}

impl From<u64> for FeatureId {
    fn from(value: u64) -> Self {
        FeatureId::Number(value)
    }
}

impl From<&str> for FeatureId {
    fn from(value: &str) -> Self {
        FeatureId::Text(value.to_string())
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureId::Number(n) => write!(f, "{}", n),
            FeatureId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One decoded record from a provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub id: Option<FeatureId>,
    pub geometry: Option<Geometry<f64>>,
    pub tags: HashMap<String, String>,
    /// Timestamp used for time-bounded streaming; only set when the layer
    /// declares a time field.
    pub time: Option<DateTime<Utc>>,
}

impl Feature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<FeatureId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_tag(key, value);
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set a tag, overwriting any earlier value for the same key
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref().map(GeometryType::of)
    }

    /// Envelope of the geometry, if any
    pub fn envelope(&self) -> Option<Extent> {
        self.geometry
            .as_ref()
            .and_then(|g| g.bounding_rect())
            .map(Extent::from)
    }
}

/// Axis-aligned rectangle in some spatial reference system
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Extent covering every representable coordinate
    pub fn unbounded() -> Self {
        Self::new(f64::MIN, f64::MIN, f64::MAX, f64::MAX)
    }

    /// All bounds finite and ordered
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Grow the extent by `margin` on every side
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Envelope intersection test; touching edges count as intersecting
    pub fn intersects(&self, other: &Extent) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_x,
                y: self.min_y,
            },
            Coord {
                x: self.max_x,
                y: self.max_y,
            },
        )
    }
}

impl From<Rect<f64>> for Extent {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

/// Static per-layer metadata exposed by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    /// `None` when the layer holds no geometries
    pub geometry_type: Option<GeometryType>,
    pub srid: u64,
    /// Changes only when the layer's data changes. `None` means the provider
    /// cannot support caching for this layer.
    pub modification_tag: Option<String>,
}

/// Time interval; an absent end is unbounded on that side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeExtent {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeExtent {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends
    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| *time >= start) && self.end.map_or(true, |end| *time <= end)
    }
}

/// Ordinal interval over the delivery order: `start` inclusive, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexExtent {
    pub start: u64,
    pub end: u64,
}

impl IndexExtent {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.start && index < self.end
    }
}

/// Optional time, spatial and ordinal bounds for streaming.
/// A `None` dimension is not filtered.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounder {
    pub time: Option<TimeExtent>,
    /// Interpreted in the layer's spatial reference system
    pub extent: Option<Extent>,
    pub index: Option<IndexExtent>,
}

impl Bounder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(mut self, time: TimeExtent) -> Self {
        self.time = Some(time);
        self
    }

    pub fn with_extent(mut self, extent: Extent) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn with_index(mut self, index: IndexExtent) -> Self {
        self.index = Some(index);
        self
    }
}

/// Property name to expected value
pub type PropertyFilter = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo_types::{line_string, point, polygon};

    #[test]
    fn test_capability_display() {
        assert_eq!(Capability::Tiles.to_string(), "tiles");
        assert_eq!(Capability::ModificationTag.to_string(), "modification-tag");
    }

    #[test]
    fn test_geometry_type_of() {
        let p: Geometry<f64> = point!(x: 1.0, y: 2.0).into();
        assert_eq!(GeometryType::of(&p), GeometryType::Point);

        let l: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        assert_eq!(GeometryType::of(&l), GeometryType::LineString);

        let poly: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into();
        assert_eq!(GeometryType::of(&poly), GeometryType::Polygon);
    }

    #[test]
    fn test_feature_id_parse_prefers_numbers() {
        assert_eq!(FeatureId::parse("42"), FeatureId::Number(42));
        assert_eq!(FeatureId::parse("a-42"), FeatureId::Text("a-42".to_string()));
        assert_eq!(FeatureId::parse("-1"), FeatureId::Text("-1".to_string()));
    }

    #[test]
    fn test_feature_tags_last_write_wins() {
        let feature = Feature::new()
            .with_tag("name", "first")
            .with_tag("name", "second");
        assert_eq!(feature.tag("name"), Some("second"));
        assert_eq!(feature.tags.len(), 1);
    }

    #[test]
    fn test_feature_envelope() {
        let feature =
            Feature::new().with_geometry(line_string![(x: -1.0, y: 2.0), (x: 3.0, y: -4.0)]);
        assert_eq!(feature.envelope(), Some(Extent::new(-1.0, -4.0, 3.0, 2.0)));
        assert_eq!(Feature::new().envelope(), None);
    }

    #[test]
    fn test_extent_intersects_and_expand() {
        let a = Extent::new(0.0, 0.0, 10.0, 10.0);
        let b = Extent::new(10.0, 10.0, 20.0, 20.0);
        let c = Extent::new(11.0, 11.0, 20.0, 20.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert!(a.expand(1.0).intersects(&c));
        assert!(a.is_valid());
        assert!(!Extent::new(1.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!Extent::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn test_time_extent_open_ends() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(TimeExtent::new(None, None).contains(&t));
        assert!(TimeExtent::new(Some(before), None).contains(&t));
        assert!(!TimeExtent::new(Some(after), None).contains(&t));
        assert!(TimeExtent::new(None, Some(t)).contains(&t));
        assert!(!TimeExtent::new(None, Some(before)).contains(&t));
    }

    #[test]
    fn test_index_extent_half_open() {
        let idx = IndexExtent::new(2, 4);
        assert!(!idx.contains(1));
        assert!(idx.contains(2));
        assert!(idx.contains(3));
        assert!(!idx.contains(4));
    }
}
