//! GeoJSON FeatureCollection parsing into temps-tiles features.

use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde_json::{Map, Value};
use temps_tiles::tags::json_tag_value;
use temps_tiles::{Feature, FeatureId, ProviderError, Result};

/// Nesting limit for geometry collections
const MAX_DEPTH: usize = 32;

/// Parse a FeatureCollection document. When `id_property` is set, that
/// property supplies the feature id and is not kept as a tag.
pub fn parse_collection(json: &str, id_property: Option<&str>) -> Result<Vec<Feature>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ProviderError::decode(format!("invalid JSON: {}", e)))?;

    let object = as_object(&value, "document")?;
    check_type(object, "FeatureCollection", "document")?;

    let features = match object.get("features") {
        Some(Value::Array(features)) => features,
        Some(_) => return Err(ProviderError::decode("features must be an array")),
        None => return Err(ProviderError::decode("FeatureCollection has no features")),
    };

    features
        .iter()
        .enumerate()
        .map(|(idx, feature)| {
            parse_feature(feature, id_property)
                .map_err(|e| ProviderError::decode(format!("features[{}]: {}", idx, message(e))))
        })
        .collect()
}

/// Parse one GeoJSON Feature object
pub fn parse_feature(value: &Value, id_property: Option<&str>) -> Result<Feature> {
    let object = as_object(value, "feature")?;
    check_type(object, "Feature", "feature")?;

    let mut feature = Feature::new();

    if let Some(id) = object.get("id") {
        feature.id = parse_id(id)?;
    }

    match object.get("geometry") {
        None | Some(Value::Null) => {}
        Some(geometry) => feature.geometry = Some(parse_geometry(geometry, 0)?),
    }

    match object.get("properties") {
        None | Some(Value::Null) => {}
        Some(Value::Object(properties)) => {
            for (key, value) in properties {
                if Some(key.as_str()) == id_property {
                    if let Some(id) = parse_id(value)? {
                        feature.id = Some(id);
                    }
                    continue;
                }
                if let Some(tag) = json_tag_value(value) {
                    feature.set_tag(key.clone(), tag);
                }
            }
        }
        Some(_) => return Err(ProviderError::decode("properties must be an object")),
    }

    Ok(feature)
}

fn parse_id(value: &Value) -> Result<Option<FeatureId>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(FeatureId::parse(s))),
        Value::Number(n) => Ok(Some(match n.as_u64() {
            Some(n) => FeatureId::Number(n),
            None => FeatureId::Text(n.to_string()),
        })),
        other => Err(ProviderError::decode(format!(
            "id must be a string or number, got {}",
            other
        ))),
    }
}

/// Parse a GeoJSON geometry object
pub fn parse_geometry(value: &Value, depth: usize) -> Result<Geometry<f64>> {
    if depth > MAX_DEPTH {
        return Err(ProviderError::decode("geometry nesting too deep"));
    }

    let object = as_object(value, "geometry")?;
    let kind = match object.get("type") {
        Some(Value::String(kind)) => kind.as_str(),
        _ => return Err(ProviderError::decode("geometry must have a type")),
    };

    if kind == "GeometryCollection" {
        let members = match object.get("geometries") {
            Some(Value::Array(members)) => members,
            _ => {
                return Err(ProviderError::decode(
                    "GeometryCollection must have a geometries array",
                ))
            }
        };
        let geometries = members
            .iter()
            .map(|m| parse_geometry(m, depth + 1))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Geometry::GeometryCollection(GeometryCollection(geometries)));
    }

    let coordinates = object
        .get("coordinates")
        .ok_or_else(|| ProviderError::decode(format!("{} must have coordinates", kind)))?;

    let geometry = match kind {
        "Point" => Geometry::Point(Point(position(coordinates)?)),
        "LineString" => Geometry::LineString(line(coordinates)?),
        "Polygon" => Geometry::Polygon(polygon(coordinates)?),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint(
            array(coordinates)?
                .iter()
                .map(|c| position(c).map(Point))
                .collect::<Result<_>>()?,
        )),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString(
            array(coordinates)?.iter().map(line).collect::<Result<_>>()?,
        )),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon(
            array(coordinates)?
                .iter()
                .map(polygon)
                .collect::<Result<_>>()?,
        )),
        other => {
            return Err(ProviderError::decode(format!(
                "unknown geometry type '{}'",
                other
            )))
        }
    };

    Ok(geometry)
}

fn position(value: &Value) -> Result<Coord<f64>> {
    let values = array(value)?;
    if values.len() < 2 {
        return Err(ProviderError::decode(
            "position needs at least two numbers",
        ));
    }

    let number = |v: &Value| {
        v.as_f64()
            .ok_or_else(|| ProviderError::decode(format!("position value {} is not a number", v)))
    };
    // Altitude and further dimensions are dropped
    Ok(Coord {
        x: number(&values[0])?,
        y: number(&values[1])?,
    })
}

fn line(value: &Value) -> Result<LineString<f64>> {
    let coords = array(value)?
        .iter()
        .map(position)
        .collect::<Result<Vec<_>>>()?;
    Ok(LineString(coords))
}

fn polygon(value: &Value) -> Result<Polygon<f64>> {
    let mut rings = array(value)?.iter().map(line).collect::<Result<Vec<_>>>()?;
    if rings.is_empty() {
        return Ok(Polygon::new(LineString(Vec::new()), Vec::new()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ProviderError::decode(format!("expected an array, got {}", value)))
}

fn as_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ProviderError::decode(format!("{} must be an object", what)))
}

fn check_type(object: &Map<String, Value>, expected: &str, what: &str) -> Result<()> {
    match object.get("type").and_then(Value::as_str) {
        Some(kind) if kind == expected => Ok(()),
        Some(kind) => Err(ProviderError::decode(format!(
            "{} type must be '{}', got '{}'",
            what, expected, kind
        ))),
        None => Err(ProviderError::decode(format!("{} must have a type", what))),
    }
}

fn message(error: ProviderError) -> String {
    match error {
        ProviderError::Decode(msg) => msg,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{line_string, point, polygon};
    use serde_json::json;

    #[test]
    fn test_collection_with_ids_and_properties() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7, "geometry": {"type": "Point", "coordinates": [1.5, 2.5, 100]},
                 "properties": {"name": "well", "depth": 12.0, "active": true, "owner": null}},
                {"type": "Feature", "id": "way/3", "geometry": null, "properties": {"tags": {"a": 1}}}
            ]
        }"#;

        let features = parse_collection(json, None).unwrap();
        assert_eq!(features.len(), 2);

        let well = &features[0];
        assert_eq!(well.id, Some(FeatureId::Number(7)));
        assert_eq!(well.geometry, Some(Geometry::Point(point!(x: 1.5, y: 2.5))));
        assert_eq!(well.tag("name"), Some("well"));
        assert_eq!(well.tag("depth"), Some("12"));
        assert_eq!(well.tag("active"), Some("true"));
        assert!(well.tag("owner").is_none());

        let way = &features[1];
        assert_eq!(way.id, Some(FeatureId::Text("way/3".to_string())));
        assert_eq!(way.geometry, None);
        assert_eq!(way.tag("tags"), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_id_property_is_promoted() {
        let feature = parse_feature(
            &json!({
                "type": "Feature",
                "id": 1,
                "geometry": null,
                "properties": {"osm_id": "42", "name": "x"}
            }),
            Some("osm_id"),
        )
        .unwrap();

        assert_eq!(feature.id, Some(FeatureId::Number(42)));
        assert!(feature.tag("osm_id").is_none());
        assert_eq!(feature.tag("name"), Some("x"));
    }

    #[test]
    fn test_geometry_types() {
        let line = parse_geometry(
            &json!({"type": "LineString", "coordinates": [[0, 0], [1, 1]]}),
            0,
        )
        .unwrap();
        assert_eq!(
            line,
            Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])
        );

        let poly = parse_geometry(
            &json!({"type": "Polygon", "coordinates": [[[0, 0], [4, 0], [4, 4], [0, 0]]]}),
            0,
        )
        .unwrap();
        assert_eq!(
            poly,
            Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 0.0)])
        );

        let multi = parse_geometry(
            &json!({"type": "MultiPolygon", "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]], [[[5, 5], [6, 5], [6, 6], [5, 5]]]]}),
            0,
        )
        .unwrap();
        assert!(matches!(multi, Geometry::MultiPolygon(ref m) if m.0.len() == 2));

        let collection = parse_geometry(
            &json!({"type": "GeometryCollection", "geometries": [
                {"type": "Point", "coordinates": [0, 0]},
                {"type": "MultiPoint", "coordinates": [[1, 1], [2, 2]]},
                {"type": "MultiLineString", "coordinates": [[[0, 0], [1, 1]]]}
            ]}),
            0,
        )
        .unwrap();
        assert!(matches!(collection, Geometry::GeometryCollection(ref c) if c.0.len() == 3));
    }

    #[test]
    fn test_errors_name_the_feature() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1]}, "properties": {}}
        ]}"#;
        let err = parse_collection(json, None).unwrap_err();
        assert!(matches!(err, ProviderError::Decode(ref m) if m.starts_with("features[0]:")));

        let err = parse_collection(r#"{"type": "Feature"}"#, None).unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));

        let err = parse_geometry(&json!({"type": "Circle", "coordinates": [0, 0]}), 0).unwrap_err();
        assert!(err.to_string().contains("Circle"));

        assert!(parse_collection("not json", None).is_err());
    }
}
