// Conversions between WGS84 longitude/latitude and Amersfoort / RD New (EPSG:28992).
// All distance, area and buffer math happens in RD New meters; geographic
// coordinates only appear at the edges (query input and exported artifacts).

use crate::error::{EngineError, Result};
use geo::MapCoords;
use geo_types::{Coord, Geometry, MultiPolygon, Point, Polygon};
use lazy_static::lazy_static;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Valid latitude range in degrees
pub const MIN_LAT: f64 = -90.0;
pub const MAX_LAT: f64 = 90.0;

/// Valid longitude range in degrees
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Projection origin of RD New (Amersfoort), degrees
pub const ORIGIN_LON: f64 = 5.387_638_888_888_89;
pub const ORIGIN_LAT: f64 = 52.156_160_555_555_56;

/// Points further than this from the origin (great-circle degrees) are outside
/// the hemisphere where the stereographic frame round-trips reliably.
pub const MAX_ORIGIN_DISTANCE_DEG: f64 = 90.0;

const WGS84_DEF: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

const RD_NEW_DEF: &str = "+proj=sterea +lat_0=52.15616055555555 +lon_0=5.38763888888889 \
+k=0.9999079 +x_0=155000 +y_0=463000 +ellps=bessel \
+towgs84=565.417,50.3319,465.552,-0.398957,0.343988,-1.8774,4.0725 +units=m +no_defs";

lazy_static! {
    static ref WGS84: std::result::Result<Proj, String> =
        Proj::from_proj_string(WGS84_DEF).map_err(|e| e.to_string());
    static ref RD_NEW: std::result::Result<Proj, String> =
        Proj::from_proj_string(RD_NEW_DEF).map_err(|e| e.to_string());
}

fn frames() -> Result<(&'static Proj, &'static Proj)> {
    match (WGS84.as_ref(), RD_NEW.as_ref()) {
        (Ok(wgs), Ok(rd)) => Ok((wgs, rd)),
        (Err(e), _) | (_, Err(e)) => Err(EngineError::Config(format!(
            "projection definition rejected: {}",
            e
        ))),
    }
}

/// Converts WGS84 longitude/latitude (degrees) to an RD New point (meters).
pub fn to_projected(lon: f64, lat: f64) -> Result<Point<f64>> {
    validate_geographic(lon, lat)?;
    validate_projection_domain(lon, lat)?;

    let (wgs, rd) = frames()?;
    let mut xyz = (lon.to_radians(), lat.to_radians(), 0.0);
    transform(wgs, rd, &mut xyz).map_err(|e| {
        EngineError::InvalidCoordinate(format!("({}, {}) could not be projected: {}", lon, lat, e))
    })?;

    let (x, y, _) = xyz;
    if !x.is_finite() || !y.is_finite() {
        return Err(EngineError::InvalidCoordinate(format!(
            "({}, {}) cannot be represented in the projected frame",
            lon, lat
        )));
    }
    Ok(Point::new(x, y))
}

/// Converts an RD New point (meters) back to WGS84 `(lon, lat)` in degrees.
pub fn to_geographic(point: Point<f64>) -> Result<(f64, f64)> {
    let (x, y) = (point.x(), point.y());
    if !x.is_finite() || !y.is_finite() {
        return Err(EngineError::InvalidCoordinate(format!(
            "projected coordinate ({}, {}) is not finite",
            x, y
        )));
    }

    let (wgs, rd) = frames()?;
    let mut xyz = (x, y, 0.0);
    transform(rd, wgs, &mut xyz).map_err(|e| {
        EngineError::InvalidCoordinate(format!(
            "projected coordinate ({}, {}) could not be inverted: {}",
            x, y, e
        ))
    })?;

    let (lon, lat) = (xyz.0.to_degrees(), xyz.1.to_degrees());
    validate_geographic(lon, lat)?;
    validate_projection_domain(lon, lat)?;
    Ok((lon, lat))
}

/// Great-circle distance in degrees from the RD New origin, on a sphere.
pub fn origin_distance_deg(lon: f64, lat: f64) -> f64 {
    let (phi1, phi2) = (ORIGIN_LAT.to_radians(), lat.to_radians());
    let dlon = (lon - ORIGIN_LON).to_radians();
    let cos_d = phi1.sin() * phi2.sin() + phi1.cos() * phi2.cos() * dlon.cos();
    cos_d.clamp(-1.0, 1.0).acos().to_degrees()
}

/// Rejects points outside the hemisphere centred on the projection origin.
pub fn validate_projection_domain(lon: f64, lat: f64) -> Result<()> {
    let distance = origin_distance_deg(lon, lat);
    if distance > MAX_ORIGIN_DISTANCE_DEG {
        return Err(EngineError::InvalidCoordinate(format!(
            "({}, {}) is {:.1} degrees from the RD New origin (max {})",
            lon, lat, distance, MAX_ORIGIN_DISTANCE_DEG
        )));
    }
    Ok(())
}

/// Rejects non-finite or out-of-range longitude/latitude.
pub fn validate_geographic(lon: f64, lat: f64) -> Result<()> {
    if !lon.is_finite() || !lat.is_finite() {
        return Err(EngineError::InvalidCoordinate(format!(
            "longitude/latitude must be finite (got {}, {})",
            lon, lat
        )));
    }
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(EngineError::InvalidCoordinate(format!(
            "latitude {} outside [{}, {}]",
            lat, MIN_LAT, MAX_LAT
        )));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(EngineError::InvalidCoordinate(format!(
            "longitude {} outside [{}, {}]",
            lon, MIN_LON, MAX_LON
        )));
    }
    Ok(())
}

fn project_coord(c: Coord<f64>) -> Result<Coord<f64>> {
    to_projected(c.x, c.y).map(|p| p.0)
}

fn unproject_coord(c: Coord<f64>) -> Result<Coord<f64>> {
    to_geographic(Point(c)).map(|(x, y)| Coord { x, y })
}

/// Projects a geographic polygon into RD New.
pub fn project_polygon(polygon: &Polygon<f64>) -> Result<Polygon<f64>> {
    polygon.try_map_coords(project_coord)
}

/// Projects a geographic multipolygon into RD New.
pub fn project_multi_polygon(mp: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    mp.try_map_coords(project_coord)
}

/// Converts any projected geometry to WGS84 for export.
pub fn unproject_geometry(geometry: &Geometry<f64>) -> Result<Geometry<f64>> {
    geometry.try_map_coords(unproject_coord)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_origin_maps_to_amersfoort() {
        // The RD origin sits at 52.15517440N 5.38720621E in WGS84
        let (lon, lat) = to_geographic(Point::new(155_000.0, 463_000.0)).unwrap();
        assert!((lon - 5.38720621).abs() < 2e-5, "lon {}", lon);
        assert!((lat - 52.15517440).abs() < 2e-5, "lat {}", lat);
    }

    #[test]
    fn test_utrecht_point_matches_reference() {
        // Reference from the RD polynomial approximation, good to ~0.3 m
        let (lon, lat) = to_geographic(Point::new(130_000.0, 455_000.0)).unwrap();
        assert!((lon - 5.022482).abs() < 1e-5, "lon {}", lon);
        assert!((lat - 52.082707).abs() < 1e-5, "lat {}", lat);
    }

    // Ground distance in meters between two nearby lon/lat pairs
    fn drift_m(lon: f64, lat: f64, lon2: f64, lat2: f64) -> f64 {
        let dy = (lat2 - lat) * 111_000.0;
        let dx = (lon2 - lon) * 111_000.0 * lat.to_radians().cos();
        dx.hypot(dy)
    }

    #[test]
    fn test_round_trip_is_sub_meter_across_netherlands() {
        for i in 0..20 {
            for j in 0..20 {
                let lon = 3.3 + 0.2 * i as f64;
                let lat = 50.7 + 0.15 * j as f64;
                let p = to_projected(lon, lat).unwrap();
                let (lon2, lat2) = to_geographic(p).unwrap();
                assert!(drift_m(lon, lat, lon2, lat2) < 0.1, "drift at {},{}", lon, lat);
            }
        }
    }

    #[test]
    fn test_round_trip_is_sub_meter_across_domain() {
        let points = [
            (0.0, 0.0),
            (-75.0, 40.0),
            (120.0, 30.0),
            (100.0, 60.0),
            (-100.0, 30.0),
            (40.0, -20.0),
            (5.0, 89.9),
            (-179.0, 85.0),
        ];
        for (lon, lat) in points {
            assert!(origin_distance_deg(lon, lat) <= MAX_ORIGIN_DISTANCE_DEG);
            let p = to_projected(lon, lat).unwrap();
            let (lon2, lat2) = to_geographic(p).unwrap();
            assert!(drift_m(lon, lat, lon2, lat2) < 1.0, "drift at {},{}: {},{}", lon, lat, lon2, lat2);
        }
    }

    #[test]
    fn test_far_side_is_rejected() {
        for (lon, lat) in [(-170.0, -60.0), (175.0, -45.0), (150.0, -30.0)] {
            let result = to_projected(lon, lat);
            assert!(
                matches!(result, Err(EngineError::InvalidCoordinate(_))),
                "{},{} should be outside the frame",
                lon,
                lat
            );
        }
    }

    #[test]
    fn test_projected_round_trip() {
        let p = Point::new(136_000.0, 455_800.0);
        let (lon, lat) = to_geographic(p).unwrap();
        let back = to_projected(lon, lat).unwrap();
        assert!((back.x() - p.x()).abs() < 0.05);
        assert!((back.y() - p.y()).abs() < 0.05);
    }

    #[test]
    fn test_invalid_latitude() {
        let result = to_projected(5.1, 91.0);
        assert!(matches!(result.unwrap_err(), EngineError::InvalidCoordinate(_)));
    }

    #[test]
    fn test_invalid_longitude() {
        let result = to_projected(-180.5, 52.0);
        assert!(matches!(result.unwrap_err(), EngineError::InvalidCoordinate(_)));
    }

    #[test]
    fn test_non_finite_input() {
        assert!(to_projected(f64::NAN, 52.0).is_err());
        assert!(to_projected(5.0, f64::INFINITY).is_err());
        assert!(to_geographic(Point::new(f64::NAN, 463_000.0)).is_err());
    }

    #[test]
    fn test_polygon_projection_keeps_shape() {
        let square = polygon![
            (x: 5.10, y: 52.08),
            (x: 5.11, y: 52.08),
            (x: 5.11, y: 52.09),
            (x: 5.10, y: 52.09),
        ];
        let projected = project_polygon(&square).unwrap();
        let width = projected.exterior().0[1].x - projected.exterior().0[0].x;
        // 0.01 degree of longitude at 52N is roughly 685 m
        assert!((width - 685.0).abs() < 10.0, "width {}", width);
    }
}
