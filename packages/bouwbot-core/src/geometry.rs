// Planar footprint geometry in the projected frame: validation and one-shot repair
// at load time, plus the exact distance test used to refine buffer candidates.

use crate::error::EngineError;
use geo::{Area, BooleanOps, Distance, Euclidean, Intersects};
use geo_types::{Coord, Line, LineString, MultiPolygon, Point, Polygon, Rect};
use std::f64::consts::TAU;
use std::panic::AssertUnwindSafe;

/// Vertices used when a buffer circle is materialized as a polygon (for export).
pub const BUFFER_SEGMENTS: usize = 64;

// Smallest area a footprint may have, in m²
const MIN_FOOTPRINT_AREA: f64 = 1e-6;

// Consecutive edges sharing a vertex fold back when either one reaches over the
// other's far end (a spike)
fn edges_fold_back(first: &Line<f64>, second: &Line<f64>) -> bool {
    second.intersects(&first.start) || first.intersects(&second.end)
}

/// True when no two non-adjacent edges of a closed ring touch and no adjacent pair
/// doubles back on itself.
pub fn ring_is_simple(ring: &LineString<f64>) -> bool {
    let edges: Vec<Line<f64>> = ring.lines().collect();
    let n = edges.len();
    for i in 0..n {
        // Successor wraps around through the closing vertex
        let next = &edges[(i + 1) % n];
        if n > 1 && edges_fold_back(&edges[i], next) {
            return false;
        }
        for j in (i + 2)..n {
            if i == 0 && j == n - 1 {
                continue;
            }
            if edges[i].intersects(&edges[j]) {
                return false;
            }
        }
    }
    true
}

fn rings(mp: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    mp.0.iter()
        .flat_map(|poly| std::iter::once(poly.exterior()).chain(poly.interiors().iter()))
}

/// Checks a footprint; `Err` carries a short reason.
pub fn validate_footprint(mp: &MultiPolygon<f64>) -> Result<(), String> {
    if mp.0.is_empty() {
        return Err("no polygon parts".to_string());
    }
    for ring in rings(mp) {
        if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err("non-finite coordinate".to_string());
        }
        if ring.0.len() < 4 {
            return Err(format!("ring with {} positions", ring.0.len()));
        }
    }
    if mp.unsigned_area() < MIN_FOOTPRINT_AREA {
        return Err("zero area".to_string());
    }
    if !rings(mp).all(ring_is_simple) {
        return Err("self-intersecting ring".to_string());
    }
    Ok(())
}

// Drops repeated vertices and rings that collapse below a triangle
fn clean_ring(ring: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for c in &ring.0 {
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    let mut ring = LineString::new(coords);
    ring.close();
    ring
}

fn clean_footprint(mp: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let polygons = mp
        .0
        .iter()
        .filter_map(|poly| {
            let exterior = clean_ring(poly.exterior());
            if exterior.0.len() < 4 {
                return None;
            }
            let interiors = poly
                .interiors()
                .iter()
                .map(clean_ring)
                .filter(|r| r.0.len() >= 4)
                .collect();
            Some(Polygon::new(exterior, interiors))
        })
        .collect();
    MultiPolygon::new(polygons)
}

// Resolves self-intersections by a boolean union with nothing.
// BooleanOps can panic on degenerate input, which counts as unrepairable.
fn self_union(mp: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let empty = MultiPolygon::new(Vec::new());
    std::panic::catch_unwind(AssertUnwindSafe(|| mp.union(&empty))).ok()
}

/// Unions all parts into one multipolygon; `None` if the boolean engine gave up.
pub fn union_all(parts: &[MultiPolygon<f64>]) -> Option<MultiPolygon<f64>> {
    std::panic::catch_unwind(AssertUnwindSafe(|| {
        parts
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, part| acc.union(part))
    }))
    .ok()
}

/// Outcome of preparing one footprint at load time.
#[derive(Debug)]
pub struct PreparedFootprint {
    pub footprint: MultiPolygon<f64>,
    pub repaired: bool,
}

/// Validates a projected footprint, attempting a single repair pass when needed.
pub fn prepare_footprint(
    id: &str,
    footprint: MultiPolygon<f64>,
) -> Result<PreparedFootprint, EngineError> {
    let first_problem = match validate_footprint(&footprint) {
        Ok(()) => {
            return Ok(PreparedFootprint {
                footprint,
                repaired: false,
            })
        }
        Err(reason) => reason,
    };

    let invalid = |reason: String| EngineError::InvalidGeometry {
        id: id.to_string(),
        reason,
    };

    if rings(&footprint).any(|r| r.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite())) {
        return Err(invalid(first_problem));
    }

    let cleaned = clean_footprint(&footprint);
    let repaired = if validate_footprint(&cleaned).is_ok() {
        cleaned
    } else {
        self_union(&cleaned)
            .ok_or_else(|| invalid(format!("{}; repair failed", first_problem)))?
    };

    validate_footprint(&repaired)
        .map_err(|reason| invalid(format!("{}; after repair: {}", first_problem, reason)))?;

    Ok(PreparedFootprint {
        footprint: repaired,
        repaired: true,
    })
}

/// Planar distance from a point to a footprint; 0 inside or on the boundary.
pub fn distance_to_footprint(p: Coord<f64>, footprint: &MultiPolygon<f64>) -> f64 {
    Euclidean::distance(&Point(p), footprint)
}

/// Exact disk/footprint intersection test: is any part of the footprint within `radius` of `center`.
pub fn footprint_within_distance(
    center: Coord<f64>,
    footprint: &MultiPolygon<f64>,
    radius: f64,
) -> bool {
    distance_to_footprint(center, footprint) <= radius
}

/// Circle outline around `center` as a polygon with `segments` vertices.
pub fn circle_polygon(center: Coord<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    let segments = segments.max(8);
    let coords: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            let angle = TAU * i as f64 / segments as f64;
            Coord {
                x: center.x + radius * angle.cos(),
                y: center.y + radius * angle.sin(),
            }
        })
        .collect();
    Polygon::new(LineString::new(coords), Vec::new())
}

/// Axis-aligned square enclosing the circle of `radius` around `center`.
pub fn circle_envelope(center: Coord<f64>, radius: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: center.x - radius,
            y: center.y - radius,
        },
        Coord {
            x: center.x + radius,
            y: center.y + radius,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]])
    }

    #[test]
    fn test_square_is_valid() {
        assert!(validate_footprint(&square(0.0, 0.0, 20.0)).is_ok());
    }

    #[test]
    fn test_bowtie_is_not_simple() {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ];
        assert!(!ring_is_simple(bowtie.exterior()));
        assert!(validate_footprint(&MultiPolygon::new(vec![bowtie])).is_err());
    }

    #[test]
    fn test_spike_is_not_simple() {
        let spike = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 5.0),
            (x: 0.0, y: 10.0),
        ];
        assert!(!ring_is_simple(spike.exterior()));
    }

    #[test]
    fn test_bowtie_is_repaired_into_two_parts() {
        let bowtie = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ];
        let prepared = prepare_footprint("bow", MultiPolygon::new(vec![bowtie])).unwrap();
        assert!(prepared.repaired);
        assert_eq!(prepared.footprint.0.len(), 2);
        assert!(validate_footprint(&prepared.footprint).is_ok());
        assert!((prepared.footprint.unsigned_area() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_duplicate_vertices_are_repaired() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        let prepared = prepare_footprint("dup", MultiPolygon::new(vec![poly])).unwrap();
        assert!(prepared.repaired);
        assert!((prepared.footprint.unsigned_area() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_polygon_is_dropped() {
        let flat = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 20.0, y: 0.0),
        ];
        let err = prepare_footprint("flat", MultiPolygon::new(vec![flat])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidGeometry { ref id, .. } if id == "flat"));
    }

    #[test]
    fn test_non_finite_is_dropped_without_repair() {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: f64::NAN, y: 0.0),
            (x: 10.0, y: 10.0),
        ];
        assert!(prepare_footprint("nan", MultiPolygon::new(vec![poly])).is_err());
    }

    #[test]
    fn test_distance_inside_and_outside() {
        let fp = square(0.0, 0.0, 20.0);
        assert_eq!(distance_to_footprint(Coord { x: 10.0, y: 10.0 }, &fp), 0.0);
        assert_eq!(distance_to_footprint(Coord { x: 20.0, y: 5.0 }, &fp), 0.0);
        assert!((distance_to_footprint(Coord { x: 30.0, y: 10.0 }, &fp) - 10.0).abs() < 1e-9);
        // Corner: 3-4-5 triangle
        assert!((distance_to_footprint(Coord { x: 23.0, y: 24.0 }, &fp) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_within_distance_matches_distance() {
        let fp = square(200.0, 0.0, 20.0);
        let center = Coord { x: 10.0, y: 10.0 };
        assert!(footprint_within_distance(center, &fp, 190.0));
        assert!(!footprint_within_distance(center, &fp, 189.9));
    }

    #[test]
    fn test_circle_polygon_radius() {
        let center = Coord { x: 100.0, y: 100.0 };
        let circle = circle_polygon(center, 50.0, BUFFER_SEGMENTS);
        assert_eq!(circle.exterior().0.len(), BUFFER_SEGMENTS + 1);
        for c in &circle.exterior().0 {
            let r = ((c.x - center.x).powi(2) + (c.y - center.y).powi(2)).sqrt();
            assert!((r - 50.0).abs() < 1e-9);
        }
        let env = circle_envelope(center, 50.0);
        assert_eq!(env.min(), Coord { x: 50.0, y: 50.0 });
        assert_eq!(env.max(), Coord { x: 150.0, y: 150.0 });
    }
}
