// Buffer queries against the building catalog.
// Every operation runs the same pre-checks in order: radius, coordinate, service
// area. Only then is the catalog touched. Candidates from the spatial index are
// always refined with the exact distance test.

use crate::catalog::{Building, CatalogStore};
use crate::context::EngineContext;
use crate::crs::to_projected;
use crate::error::{EngineError, Result};
use crate::geometry::{circle_envelope, circle_polygon, footprint_within_distance, BUFFER_SEGMENTS};
use crate::stats::{self, SummaryStats, VolumeStats};
use geo_types::{Point, Polygon, Rect};
use std::sync::Arc;
use tracing::debug;

/// A validated query circle.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    /// Center in the projected frame.
    pub center: Point<f64>,
    pub lon: f64,
    pub lat: f64,
    pub radius_m: f64,
}

impl Buffer {
    /// Polygonal outline of the circle, in the projected frame.
    pub fn outline(&self) -> Polygon<f64> {
        circle_polygon(self.center.0, self.radius_m, BUFFER_SEGMENTS)
    }

    pub fn envelope(&self) -> Rect<f64> {
        circle_envelope(self.center.0, self.radius_m)
    }
}

/// Buildings matched by one query, in catalog order.
#[derive(Debug, Clone)]
pub struct QueryResult {
    catalog: Arc<CatalogStore>,
    indices: Vec<usize>,
    /// Buildings inside the buffer before the height filter. With a filter,
    /// only those with a known height are counted.
    pub total_in_buffer: usize,
    pub buffer: Buffer,
    pub min_height_m: Option<f64>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Catalog positions of the matches, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn buildings(&self) -> impl Iterator<Item = &Building> + '_ {
        self.indices.iter().filter_map(|&i| self.catalog.get(i))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.buildings().map(|b| b.id.as_str()).collect()
    }

    pub fn height_stats(&self) -> SummaryStats {
        stats::height_stats(self.buildings())
    }

    pub fn footprint_stats(&self) -> SummaryStats {
        stats::footprint_stats(self.buildings())
    }

    pub fn total_volume(&self) -> VolumeStats {
        stats::total_volume(self.buildings())
    }

    pub fn tallest(&self) -> Option<&Building> {
        stats::tallest(self.buildings())
    }
}

pub struct QueryEngine {
    context: Arc<EngineContext>,
}

impl QueryEngine {
    pub fn new(context: Arc<EngineContext>) -> Self {
        QueryEngine { context }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    fn validate_radius(&self, radius_m: f64) -> Result<()> {
        let max = self.context.config().max_radius_m;
        if !radius_m.is_finite() || radius_m <= 0.0 || radius_m > max {
            debug!(radius_m, max, "Rejected radius");
            return Err(EngineError::InvalidRadius {
                radius: radius_m,
                max,
            });
        }
        Ok(())
    }

    /// Validates radius and coordinate only. No service-area check.
    pub fn buffer(&self, lon: f64, lat: f64, radius_m: f64) -> Result<Buffer> {
        self.checked_buffer(lon, lat, radius_m, None)
    }

    // Radius, then height threshold (if any), then coordinate
    fn checked_buffer(
        &self,
        lon: f64,
        lat: f64,
        radius_m: f64,
        min_height_m: Option<f64>,
    ) -> Result<Buffer> {
        self.validate_radius(radius_m)?;
        if let Some(h) = min_height_m.filter(|h| !h.is_finite()) {
            debug!(min_height_m = h, "Rejected height threshold");
            return Err(EngineError::InvalidHeight(h));
        }
        let center = to_projected(lon, lat).inspect_err(|e| debug!(lon, lat, error = %e, "Rejected coordinate"))?;
        Ok(Buffer {
            center,
            lon,
            lat,
            radius_m,
        })
    }

    fn service_area_buffer(
        &self,
        lon: f64,
        lat: f64,
        radius_m: f64,
        min_height_m: Option<f64>,
    ) -> Result<Buffer> {
        let buffer = self.checked_buffer(lon, lat, radius_m, min_height_m)?;
        let boundary = self.context.boundary()?;
        if !boundary.contains(buffer.center) {
            debug!(lon, lat, area = boundary.name(), "Point outside service area");
            return Err(EngineError::OutOfServiceArea {
                area: boundary.name().to_string(),
            });
        }
        Ok(buffer)
    }

    fn collect(&self, buffer: Buffer, min_height_m: Option<f64>) -> Result<QueryResult> {
        let catalog = self.context.catalog()?;
        let candidates = catalog.index().candidates_intersecting(&buffer.envelope());
        let candidate_count = candidates.len();

        let in_buffer: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| {
                catalog.get(i).is_some_and(|b| {
                    footprint_within_distance(buffer.center.0, &b.footprint, buffer.radius_m)
                })
            })
            .collect();

        let (indices, total_in_buffer) = match min_height_m {
            None => {
                let total = in_buffer.len();
                (in_buffer, total)
            }
            Some(min) => {
                let with_height: Vec<(usize, f64)> = in_buffer
                    .into_iter()
                    .filter_map(|i| catalog.get(i).and_then(Building::height_m).map(|h| (i, h)))
                    .collect();
                let total = with_height.len();
                let kept = with_height
                    .into_iter()
                    .filter(|&(_, h)| h >= min)
                    .map(|(i, _)| i)
                    .collect();
                (kept, total)
            }
        };

        debug!(
            lon = buffer.lon,
            lat = buffer.lat,
            radius_m = buffer.radius_m,
            candidates = candidate_count,
            in_buffer = total_in_buffer,
            matches = indices.len(),
            "Buffer query"
        );
        Ok(QueryResult {
            catalog,
            indices,
            total_in_buffer,
            buffer,
            min_height_m,
        })
    }

    /// Buildings whose footprint lies at least partly within `radius_m` of the point.
    pub fn find_within_buffer(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QueryResult> {
        let buffer = self.service_area_buffer(lon, lat, radius_m, None)?;
        self.collect(buffer, None)
    }

    /// As `find_within_buffer`, keeping only buildings with a known height of at least `min_height_m`.
    pub fn find_within_buffer_above_height(
        &self,
        lon: f64,
        lat: f64,
        radius_m: f64,
        min_height_m: f64,
    ) -> Result<QueryResult> {
        let buffer = self.service_area_buffer(lon, lat, radius_m, Some(min_height_m))?;
        self.collect(buffer, Some(min_height_m))
    }

    pub fn height_stats(&self, lon: f64, lat: f64, radius_m: f64) -> Result<SummaryStats> {
        Ok(self.find_within_buffer(lon, lat, radius_m)?.height_stats())
    }

    pub fn tallest(&self, lon: f64, lat: f64, radius_m: f64) -> Result<Option<Building>> {
        Ok(self.find_within_buffer(lon, lat, radius_m)?.tallest().cloned())
    }

    pub fn footprint_stats(&self, lon: f64, lat: f64, radius_m: f64) -> Result<SummaryStats> {
        Ok(self.find_within_buffer(lon, lat, radius_m)?.footprint_stats())
    }

    pub fn total_volume(&self, lon: f64, lat: f64, radius_m: f64) -> Result<VolumeStats> {
        Ok(self.find_within_buffer(lon, lat, radius_m)?.total_volume())
    }
}
