// Service-area boundary: every polygon part of the source unioned once at load.

use crate::config::{BoundaryConfig, SourceCrs};
use crate::crs::project_multi_polygon;
use crate::error::{EngineError, Result};
use crate::geojson_features::{polygonal_from_value, read_feature_collection, resolve_crs};
use crate::geometry::union_all;
use geo::{BoundingRect, Intersects};
use geo_types::{MultiPolygon, Point, Rect};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RegionBoundary {
    name: String,
    area: MultiPolygon<f64>,
    bounds: Rect<f64>,
}

impl RegionBoundary {
    pub fn load(config: &BoundaryConfig) -> Result<Self> {
        let path = config.path.as_path();
        let collection = read_feature_collection(path)?;
        let crs = resolve_crs(&collection, config.source_crs, path)?;

        let mut parts = Vec::new();
        for feature in &collection.features {
            let Some(geometry) = feature.geometry.as_ref() else {
                continue;
            };
            let part = polygonal_from_value(geometry).map_err(|e| EngineError::unavailable(path, e))?;
            if let Some(part) = part {
                let part = match crs {
                    SourceCrs::Geographic => project_multi_polygon(&part)
                        .map_err(|e| EngineError::unavailable(path, e))?,
                    SourceCrs::Projected | SourceCrs::Auto => part,
                };
                parts.push(part);
            }
        }

        let region = Self::build(&config.service_area_name, parts, path)?;
        info!(
            path = %path.display(),
            parts = region.area.0.len(),
            "Service area boundary loaded"
        );
        Ok(region)
    }

    /// Builds a boundary from parts already in the projected frame.
    pub fn from_polygons(name: impl Into<String>, parts: Vec<MultiPolygon<f64>>) -> Result<Self> {
        Self::build(&name.into(), parts, Path::new("<memory>"))
    }

    fn build(name: &str, parts: Vec<MultiPolygon<f64>>, path: &Path) -> Result<Self> {
        if parts.iter().all(|p| p.0.is_empty()) {
            return Err(EngineError::unavailable(path, "no polygon parts in boundary"));
        }
        let area = union_all(&parts)
            .ok_or_else(|| EngineError::unavailable(path, "boundary parts could not be unioned"))?;
        let bounds = area
            .bounding_rect()
            .ok_or_else(|| EngineError::unavailable(path, "boundary is empty after union"))?;

        Ok(RegionBoundary {
            name: name.to_string(),
            area,
            bounds,
        })
    }

    /// Cover test: points on the boundary edge count as inside.
    pub fn contains(&self, point: Point<f64>) -> bool {
        self.bounds.intersects(&point.0) && self.area.intersects(&point.0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn area(&self) -> &MultiPolygon<f64> {
        &self.area
    }

    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn rect_part(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    #[test]
    fn test_contains_uses_cover_semantics() {
        let region = RegionBoundary::from_polygons("Test", vec![rect_part(0.0, 0.0, 100.0, 100.0)]).unwrap();
        assert!(region.contains(Point::new(50.0, 50.0)));
        assert!(region.contains(Point::new(100.0, 50.0)));
        assert!(region.contains(Point::new(0.0, 0.0)));
        assert!(!region.contains(Point::new(100.1, 50.0)));
    }

    #[test]
    fn test_multi_part_union() {
        let region = RegionBoundary::from_polygons(
            "Test",
            vec![rect_part(0.0, 0.0, 10.0, 10.0), rect_part(5.0, 0.0, 20.0, 10.0), rect_part(100.0, 100.0, 110.0, 110.0)],
        )
        .unwrap();
        assert_eq!(region.area().0.len(), 2);
        assert!(region.contains(Point::new(15.0, 5.0)));
        assert!(region.contains(Point::new(105.0, 105.0)));
        assert!(!region.contains(Point::new(50.0, 50.0)));
    }

    #[test]
    fn test_no_parts_is_unavailable() {
        let err = RegionBoundary::from_polygons("Test", Vec::new()).unwrap_err();
        assert_eq!(err.reason(), "data_unavailable");
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let config = BoundaryConfig {
            path: "/nonexistent/utrecht.geojson".into(),
            ..BoundaryConfig::default()
        };
        assert_eq!(RegionBoundary::load(&config).unwrap_err().reason(), "data_unavailable");
    }
}
