//! Well-known binary geometry decoding.
//!
//! Parsing is done by the `wkb` reader, which handles OGC WKB (as produced by
//! `ST_AsBinary`), ISO Z/M codes and PostGIS EWKB in either byte order. The
//! parsed geometry is converted into `geo_types`; Z and M ordinates are dropped.

use ::wkb::reader::read_wkb;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, GeometryType as WkbKind, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use temps_tiles::{ProviderError, Result};

/// Decode a WKB or EWKB byte string
pub fn decode(bytes: &[u8]) -> Result<Geometry<f64>> {
    let parsed =
        read_wkb(bytes).map_err(|e| ProviderError::decode(format!("invalid wkb: {}", e)))?;
    to_geometry(&parsed)
}

/// Decode hex-encoded (E)WKB, the text form PostGIS uses for geometry values
pub fn decode_hex(text: &str) -> Result<Geometry<f64>> {
    let bytes = hex::decode(text.trim())
        .map_err(|e| ProviderError::decode(format!("invalid hex wkb: {}", e)))?;
    decode(&bytes)
}

fn to_geometry<G: GeometryTrait<T = f64>>(geometry: &G) -> Result<Geometry<f64>> {
    let converted = match geometry.as_type() {
        WkbKind::Point(p) => Geometry::Point(point(p)),
        WkbKind::LineString(l) => Geometry::LineString(line_string(l)),
        WkbKind::Polygon(p) => Geometry::Polygon(polygon(p)),
        WkbKind::MultiPoint(m) => {
            Geometry::MultiPoint(MultiPoint(m.points().map(|p| point(&p)).collect()))
        }
        WkbKind::MultiLineString(m) => Geometry::MultiLineString(MultiLineString(
            m.line_strings().map(|l| line_string(&l)).collect(),
        )),
        WkbKind::MultiPolygon(m) => {
            Geometry::MultiPolygon(MultiPolygon(m.polygons().map(|p| polygon(&p)).collect()))
        }
        WkbKind::GeometryCollection(c) => Geometry::GeometryCollection(GeometryCollection(
            c.geometries()
                .map(|g| to_geometry(&g))
                .collect::<Result<Vec<_>>>()?,
        )),
        WkbKind::Rect(_) | WkbKind::Triangle(_) | WkbKind::Line(_) => {
            return Err(ProviderError::decode("unsupported wkb geometry type"))
        }
    };

    Ok(converted)
}

fn coord<C: CoordTrait<T = f64>>(c: &C) -> Coord<f64> {
    Coord { x: c.x(), y: c.y() }
}

/// POINT EMPTY has no coordinate and becomes a NaN point, as PostGIS writes it
fn point<P: PointTrait<T = f64>>(p: &P) -> Point<f64> {
    match p.coord() {
        Some(c) => Point(coord(&c)),
        None => Point::new(f64::NAN, f64::NAN),
    }
}

fn line_string<L: LineStringTrait<T = f64>>(l: &L) -> LineString<f64> {
    LineString(l.coords().map(|c| coord(&c)).collect())
}

fn polygon<P: PolygonTrait<T = f64>>(p: &P) -> Polygon<f64> {
    let exterior = p
        .exterior()
        .map(|ring| line_string(&ring))
        .unwrap_or_else(|| LineString(Vec::new()));
    let interiors = p.interiors().map(|ring| line_string(&ring)).collect();
    Polygon::new(exterior, interiors)
}
