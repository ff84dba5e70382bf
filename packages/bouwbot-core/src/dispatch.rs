// Request dispatch: one tagged request in, one caller-facing response out.
// Every building operation exports the buffer outline so the client can draw it,
// and operations that return building sets also export those (capped). Errors
// never escape `QueryService::handle`; they become `{ok: false, reason, message}`.

use crate::config::{DEFAULT_MIN_HEIGHT_M, DEFAULT_RADIUS_M};
use crate::context::EngineContext;
use crate::crs::to_geographic;
use crate::error::{EngineError, Result};
use crate::export::{ArtifactSink, ExportEncoder};
use crate::gazetteer::{PlaceResolver, ResolveError};
use crate::models::{
    MapLayer, MapView, QueryFailure, QueryResponse, QuerySuccess, ResponseStats, TallestBuilding,
};
use crate::query::{Buffer, QueryEngine, QueryResult};
use geo::InteriorPoint;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

const ZOOM_PLACE: u8 = 13;
const ZOOM_AREA: u8 = 14;
const ZOOM_DETAIL: u8 = 15;

fn default_radius() -> f64 {
    DEFAULT_RADIUS_M
}

fn default_min_height() -> f64 {
    DEFAULT_MIN_HEIGHT_M
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum QueryRequest {
    FindWithinBuffer {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    FindWithinBufferAboveHeight {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
        #[serde(default = "default_min_height")]
        min_height_m: f64,
    },
    HeightStats {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    Tallest {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    FootprintStats {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    TotalVolume {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    /// Buffer outline only; no service-area check.
    DrawBuffer {
        lat: f64,
        lon: f64,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
    ShowPlace {
        place: String,
    },
    BufferPlace {
        place: String,
        #[serde(default = "default_radius")]
        radius_m: f64,
    },
}

impl QueryRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            QueryRequest::FindWithinBuffer { .. } => "find_within_buffer",
            QueryRequest::FindWithinBufferAboveHeight { .. } => "find_within_buffer_above_height",
            QueryRequest::HeightStats { .. } => "height_stats",
            QueryRequest::Tallest { .. } => "tallest",
            QueryRequest::FootprintStats { .. } => "footprint_stats",
            QueryRequest::TotalVolume { .. } => "total_volume",
            QueryRequest::DrawBuffer { .. } => "draw_buffer",
            QueryRequest::ShowPlace { .. } => "show_place",
            QueryRequest::BufferPlace { .. } => "buffer_place",
        }
    }
}

// Whole meters, as shown to users
fn meters(radius_m: f64) -> i64 {
    radius_m.trunc() as i64
}

fn no_buildings(radius_m: f64) -> String {
    format!("No buildings found within {}m.", meters(radius_m))
}

pub struct QueryService {
    engine: QueryEngine,
    encoder: ExportEncoder,
    sink: Arc<dyn ArtifactSink>,
    places: Option<Arc<dyn PlaceResolver>>,
}

impl QueryService {
    pub fn new(context: Arc<EngineContext>, sink: Arc<dyn ArtifactSink>) -> Self {
        let encoder = ExportEncoder::from_config(&context.config().export);
        QueryService {
            engine: QueryEngine::new(context),
            encoder,
            sink,
            places: None,
        }
    }

    pub fn with_place_resolver(mut self, resolver: Arc<dyn PlaceResolver>) -> Self {
        self.places = Some(resolver);
        self
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Parses a JSON request body and handles it.
    pub fn handle_json(&self, body: &str) -> QueryResponse {
        match serde_json::from_str::<QueryRequest>(body) {
            Ok(request) => self.handle(&request),
            Err(e) => {
                let err = EngineError::InvalidRequest(e.to_string());
                debug!(error = %err, "Rejected request body");
                QueryResponse::Failure(QueryFailure::from(&err))
            }
        }
    }

    pub fn handle(&self, request: &QueryRequest) -> QueryResponse {
        match self.run(request) {
            Ok(success) => QueryResponse::Success(success),
            Err(err) => {
                if err.is_caller_error() {
                    debug!(operation = request.operation(), reason = err.reason(), error = %err, "Request rejected");
                } else {
                    error!(operation = request.operation(), reason = err.reason(), error = %err, "Request failed");
                }
                QueryResponse::Failure(QueryFailure::from(&err))
            }
        }
    }

    fn run(&self, request: &QueryRequest) -> Result<QuerySuccess> {
        match *request {
            QueryRequest::FindWithinBuffer { lat, lon, radius_m } => {
                self.find_within_buffer(lon, lat, radius_m)
            }
            QueryRequest::FindWithinBufferAboveHeight {
                lat,
                lon,
                radius_m,
                min_height_m,
            } => self.find_above_height(lon, lat, radius_m, min_height_m),
            QueryRequest::HeightStats { lat, lon, radius_m } => self.height_stats(lon, lat, radius_m),
            QueryRequest::Tallest { lat, lon, radius_m } => self.tallest(lon, lat, radius_m),
            QueryRequest::FootprintStats { lat, lon, radius_m } => {
                self.footprint_stats(lon, lat, radius_m)
            }
            QueryRequest::TotalVolume { lat, lon, radius_m } => self.total_volume(lon, lat, radius_m),
            QueryRequest::DrawBuffer { lat, lon, radius_m } => {
                let buffer = self.engine.buffer(lon, lat, radius_m)?;
                let map = self.buffer_map(&buffer, ZOOM_DETAIL, "Selected point")?;
                Ok(QuerySuccess::new(
                    0,
                    format!("Drew a {}m buffer around the selected point.", meters(radius_m)),
                    map,
                ))
            }
            QueryRequest::ShowPlace { ref place } => {
                let (lon, lat) = self.resolve(place)?;
                let map = MapView::new(lon, lat, ZOOM_PLACE).with_layer(MapLayer::marker(lon, lat, place.trim()));
                Ok(QuerySuccess::new(0, format!("Showing {} on the map.", place.trim()), map))
            }
            QueryRequest::BufferPlace { ref place, radius_m } => {
                let (lon, lat) = self.resolve(place)?;
                let buffer = self.engine.buffer(lon, lat, radius_m)?;
                let map = self.buffer_map(&buffer, ZOOM_AREA, place.trim())?;
                Ok(QuerySuccess::new(
                    0,
                    format!("Drew a {}m buffer around {}.", meters(radius_m), place.trim()),
                    map,
                ))
            }
        }
    }

    fn resolve(&self, place: &str) -> Result<(f64, f64)> {
        let resolver = self
            .places
            .as_ref()
            .ok_or_else(|| ResolveError::NotFound(place.trim().to_string()))?;
        Ok(resolver.resolve(place)?)
    }

    // Marker on the query point plus the exported buffer outline
    fn buffer_map(&self, buffer: &Buffer, zoom: u8, label: &str) -> Result<MapView> {
        let artifact = self.encoder.encode_buffer(buffer)?;
        let url = self.sink.publish(&artifact)?;
        Ok(MapView::new(buffer.lon, buffer.lat, zoom)
            .with_layer(MapLayer::marker(buffer.lon, buffer.lat, label))
            .with_layer(MapLayer::geojson_url("Buffer", url)))
    }

    // Exports the matched buildings and adds them as a layer; returns the truncation flag
    fn add_buildings_layer(&self, map: &mut MapView, result: &QueryResult, name: &str) -> Result<bool> {
        let artifact = self.encoder.encode_buildings(result)?;
        let url = self.sink.publish(&artifact)?;
        map.layers.push(MapLayer::geojson_url(name, url));
        Ok(artifact.truncated)
    }

    fn find_within_buffer(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QuerySuccess> {
        let result = self.engine.find_within_buffer(lon, lat, radius_m)?;
        let mut map = self.buffer_map(&result.buffer, ZOOM_AREA, "Selected point")?;
        let count = result.len();
        if count == 0 {
            return Ok(QuerySuccess::new(0, no_buildings(radius_m), map));
        }

        let truncated = self.add_buildings_layer(&mut map, &result, "Filtered buildings")?;
        let mut summary = format!("Found {} buildings within {}m.", count, meters(radius_m));
        if truncated {
            summary.push_str(&format!(
                " Exported first {} buildings to GeoJSON.",
                self.encoder.max_features()
            ));
        } else {
            summary.push_str(" Exported results to GeoJSON.");
        }

        let mut success = QuerySuccess::new(count, summary, map);
        success.truncated = truncated;
        Ok(success)
    }

    fn find_above_height(
        &self,
        lon: f64,
        lat: f64,
        radius_m: f64,
        min_height_m: f64,
    ) -> Result<QuerySuccess> {
        let result = self
            .engine
            .find_within_buffer_above_height(lon, lat, radius_m, min_height_m)?;
        let label = format!("≥{}m filter", min_height_m);
        let mut map = self.buffer_map(&result.buffer, ZOOM_AREA, &label)?;
        let stats = result.height_stats();
        let count = result.len();

        let mut summary = format!(
            "Within {}m: {} / {} buildings are ≥ {}m.",
            meters(radius_m),
            count,
            result.total_in_buffer,
            min_height_m
        );
        if let (Some(min), Some(avg), Some(max)) = (stats.min, stats.avg, stats.max) {
            summary.push_str(&format!(" (min={:.1}, avg={:.1}, max={:.1})", min, avg, max));
        }

        let mut truncated = false;
        if count > 0 {
            truncated = self.add_buildings_layer(&mut map, &result, "Height filtered buildings")?;
            if truncated {
                summary.push_str(&format!(
                    " Exported first {} buildings.",
                    self.encoder.max_features()
                ));
            }
        }

        let mut success = QuerySuccess::new(count, summary, map);
        success.total_in_buffer = Some(result.total_in_buffer);
        success.min_height_m = Some(min_height_m);
        success.stats = Some(ResponseStats::Summary(stats));
        success.truncated = truncated;
        Ok(success)
    }

    fn height_stats(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QuerySuccess> {
        let result = self.engine.find_within_buffer(lon, lat, radius_m)?;
        let map = self.buffer_map(&result.buffer, ZOOM_AREA, "Selected point")?;
        let stats = result.height_stats();

        let summary = match (stats.min, stats.avg, stats.max) {
            _ if result.is_empty() => no_buildings(radius_m),
            (Some(min), Some(avg), Some(max)) => format!(
                "Within {}m: min={:.1}m, avg={:.1}m, max={:.1}m (n={}).",
                meters(radius_m),
                min,
                avg,
                max,
                stats.count
            ),
            _ => "No valid height values in this area.".to_string(),
        };

        let mut success = QuerySuccess::new(stats.count, summary, map);
        success.stats = Some(ResponseStats::Summary(stats));
        Ok(success)
    }

    fn tallest(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QuerySuccess> {
        let result = self.engine.find_within_buffer(lon, lat, radius_m)?;
        let mut map = self.buffer_map(&result.buffer, ZOOM_DETAIL, "Query point")?;
        let count = result.height_stats().count;

        let Some(building) = result.tallest() else {
            let summary = if result.is_empty() {
                no_buildings(radius_m)
            } else {
                "No valid height values in this area.".to_string()
            };
            return Ok(QuerySuccess::new(0, summary, map));
        };
        // Only buildings with a height are ever returned here
        let height_m = building.height_m().unwrap_or_default();

        let artifact = self.encoder.encode_building(building)?;
        let url = self.sink.publish(&artifact)?;
        map.layers.push(MapLayer::geojson_url("Tallest building", url));

        let (t_lon, t_lat) = match building.footprint.interior_point() {
            Some(point) => to_geographic(point)?,
            None => (lon, lat),
        };
        map.layers.push(MapLayer::marker(
            t_lon,
            t_lat,
            format!("Tallest building ({:.1}m)", height_m),
        ));

        let summary = format!(
            "Tallest building within {}m is {:.1}m (id={}).",
            meters(radius_m),
            height_m,
            building.id
        );
        let mut success = QuerySuccess::new(count, summary, map);
        success.tallest = Some(TallestBuilding {
            id: building.id.clone(),
            height_m,
            lat: t_lat,
            lon: t_lon,
        });
        Ok(success)
    }

    fn footprint_stats(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QuerySuccess> {
        let result = self.engine.find_within_buffer(lon, lat, radius_m)?;
        let map = self.buffer_map(&result.buffer, ZOOM_AREA, "Query point")?;
        let stats = result.footprint_stats();

        let summary = match (stats.min, stats.avg, stats.max) {
            (Some(min), Some(avg), Some(max)) => format!(
                "Within {}m: footprint min={:.1} m², avg={:.1} m², max={:.1} m² (n={}).",
                meters(radius_m),
                min,
                avg,
                max,
                stats.count
            ),
            _ => no_buildings(radius_m),
        };

        let mut success = QuerySuccess::new(stats.count, summary, map);
        success.stats = Some(ResponseStats::Summary(stats));
        Ok(success)
    }

    fn total_volume(&self, lon: f64, lat: f64, radius_m: f64) -> Result<QuerySuccess> {
        let result = self.engine.find_within_buffer(lon, lat, radius_m)?;
        let map = self.buffer_map(&result.buffer, ZOOM_AREA, "Query point")?;
        let volume = result.total_volume();

        let summary = match (volume.avg, volume.max) {
            _ if result.is_empty() => no_buildings(radius_m),
            (Some(avg), Some(max)) => format!(
                "Within {}m: total volume ≈ {:.0} m³ (avg={:.0} m³, max={:.0} m³, n={}).",
                meters(radius_m),
                volume.total,
                avg,
                max,
                volume.count
            ),
            _ => "No valid volume values in this area.".to_string(),
        };

        let mut success = QuerySuccess::new(volume.count, summary, map);
        success.stats = Some(ResponseStats::Volume(volume));
        Ok(success)
    }
}
