// GeoJSON reading and writing without an intermediate GeoJSON crate: features are
// deserialized with serde and coordinates are turned into geo-types directly.

use crate::config::SourceCrs;
use crate::error::{EngineError, Result};
use flate2::read::GzDecoder;
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::io::Read;
use std::path::Path;

// A FeatureCollection as found on disk
#[derive(Debug, Deserialize)]
pub struct RawFeatureCollection {
    #[serde(default)]
    pub crs: Option<Value>,
    #[serde(default)]
    pub features: Vec<RawFeature>,
}

// One feature; every member is optional so a single bad record cannot fail the file
#[derive(Debug, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(default)]
    pub geometry: Option<Value>,
}

impl RawFeature {
    /// Property lookup that tolerates a missing properties object.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.as_ref().and_then(|p| p.get(key))
    }
}

// Function to detect if data is gzipped (checking for gzip magic number)
fn is_gzipped(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B
}

// Function to decompress gzipped data, passing plain data through untouched
fn decompress_gzip(data: Vec<u8>) -> std::result::Result<Vec<u8>, String> {
    if !is_gzipped(&data) {
        return Ok(data);
    }

    let mut decoder = GzDecoder::new(&data[..]);
    let mut decompressed_data = Vec::new();
    decoder
        .read_to_end(&mut decompressed_data)
        .map_err(|e| format!("Error decompressing gzip data: {}", e))?;

    Ok(decompressed_data)
}

/// Reads a (possibly gzip-compressed) GeoJSON FeatureCollection from disk.
pub fn read_feature_collection(path: &Path) -> Result<RawFeatureCollection> {
    let bytes = std::fs::read(path).map_err(|e| EngineError::unavailable(path, e))?;
    let bytes = decompress_gzip(bytes).map_err(|e| EngineError::unavailable(path, e))?;
    parse_feature_collection(&bytes).map_err(|e| EngineError::unavailable(path, e))
}

pub fn parse_feature_collection(bytes: &[u8]) -> std::result::Result<RawFeatureCollection, String> {
    serde_json::from_slice(bytes).map_err(|e| format!("Invalid GeoJSON: {}", e))
}

/// Resolves the frame a collection's coordinates are in.
///
/// Returns `Projected` or `Geographic`, never `Auto`.
pub fn resolve_crs(
    collection: &RawFeatureCollection,
    configured: SourceCrs,
    path: &Path,
) -> Result<SourceCrs> {
    if configured != SourceCrs::Auto {
        return Ok(configured);
    }

    // Named CRS as written by GDAL: {"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::28992"}}
    let name = collection
        .crs
        .as_ref()
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str);

    match name {
        None => Ok(SourceCrs::Geographic),
        Some(n) if n.contains("28992") => Ok(SourceCrs::Projected),
        Some(n) if n.contains("4326") || n.contains("CRS84") => Ok(SourceCrs::Geographic),
        Some(n) => Err(EngineError::unavailable(
            path,
            format!("unsupported coordinate reference system {}", n),
        )),
    }
}

/// Reads a numeric property: JSON numbers or numeric strings, finite only.
pub fn number_value(value: Option<&Value>) -> Option<f64> {
    let v = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Renders an identifier value as a string; `null` and structured values yield `None`.
pub fn id_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_position(value: &Value) -> std::result::Result<Coord<f64>, String> {
    let arr = value
        .as_array()
        .ok_or_else(|| "position is not an array".to_string())?;
    if arr.len() < 2 {
        return Err(format!("position has {} values, need 2", arr.len()));
    }
    let x = arr[0].as_f64().ok_or("position x is not a number")?;
    let y = arr[1].as_f64().ok_or("position y is not a number")?;
    Ok(Coord { x, y })
}

fn parse_ring(value: &Value) -> std::result::Result<LineString<f64>, String> {
    let positions = value
        .as_array()
        .ok_or_else(|| "ring is not an array".to_string())?;
    let coords = positions
        .iter()
        .map(parse_position)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

fn parse_polygon(value: &Value) -> std::result::Result<Polygon<f64>, String> {
    let rings = value
        .as_array()
        .ok_or_else(|| "polygon is not an array of rings".to_string())?;
    let mut rings = rings
        .iter()
        .map(parse_ring)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if rings.is_empty() {
        return Err("polygon has no rings".to_string());
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

/// Parses a Polygon or MultiPolygon geometry object.
///
/// `Ok(None)` means the geometry is of another type (points, lines), which the
/// caller skips. `Err` means the coordinates are malformed.
pub fn polygonal_from_value(value: &Value) -> std::result::Result<Option<MultiPolygon<f64>>, String> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or("");
    let coordinates = value.get("coordinates");

    match (kind, coordinates) {
        ("Polygon", Some(coords)) => Ok(Some(MultiPolygon::new(vec![parse_polygon(coords)?]))),
        ("MultiPolygon", Some(coords)) => {
            let polygons = coords
                .as_array()
                .ok_or_else(|| "multipolygon is not an array".to_string())?
                .iter()
                .map(parse_polygon)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        ("Polygon", None) | ("MultiPolygon", None) => Err(format!("{} without coordinates", kind)),
        _ => Ok(None),
    }
}

fn line_coordinates(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.0.iter().map(|c| [c.x, c.y]).collect()
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .map(line_coordinates)
        .collect()
}

/// Serializes a geometry as a GeoJSON geometry object.
pub fn geometry_to_value(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::LineString(ls) => {
            json!({ "type": "LineString", "coordinates": line_coordinates(ls) })
        }
        Geometry::Polygon(poly) => {
            json!({ "type": "Polygon", "coordinates": polygon_coordinates(poly) })
        }
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_coordinates).collect::<Vec<_>>(),
        }),
        Geometry::GeometryCollection(gc) => json!({
            "type": "GeometryCollection",
            "geometries": gc.0.iter().map(geometry_to_value).collect::<Vec<_>>(),
        }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| [p.x(), p.y()]).collect::<Vec<_>>(),
        }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line_coordinates).collect::<Vec<_>>(),
        }),
        Geometry::Line(line) => json!({
            "type": "LineString",
            "coordinates": [[line.start.x, line.start.y], [line.end.x, line.end.y]],
        }),
        Geometry::Rect(rect) => geometry_to_value(&Geometry::Polygon(rect.to_polygon())),
        Geometry::Triangle(tri) => geometry_to_value(&Geometry::Polygon(tri.to_polygon())),
    }
}

/// Builds a GeoJSON Feature from a geometry and a properties object.
pub fn feature(geometry: &Geometry<f64>, properties: Value) -> Value {
    json!({
        "type": "Feature",
        "properties": properties,
        "geometry": geometry_to_value(geometry),
    })
}

/// Wraps features into a FeatureCollection.
pub fn feature_collection(features: Vec<Value>) -> Value {
    json!({ "type": "FeatureCollection", "features": features })
}
