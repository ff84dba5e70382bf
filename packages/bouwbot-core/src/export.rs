// GeoJSON export of query results.
// Geometry is converted back to WGS84 before serialization and at most
// `max_features` features are written. Publishing is delegated to an
// `ArtifactSink`, which turns the artifact into a retrievable URL.

use crate::cache_keys::{make_artifact_file_name, make_artifact_id};
use crate::catalog::Building;
use crate::config::ExportConfig;
use crate::crs::unproject_geometry;
use crate::error::{EngineError, Result};
use crate::geojson_features::{feature, feature_collection};
use crate::query::{Buffer, QueryResult};
use geo_types::Geometry;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A serialized, possibly truncated, FeatureCollection ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub id: String,
    pub file_name: String,
    pub geojson: Value,
    /// Features actually written.
    pub feature_count: usize,
    /// Features offered before the cap was applied.
    pub total_features: usize,
    pub truncated: bool,
}

/// Properties written for every building feature. Missing values become `null`.
pub fn building_properties(building: &Building) -> Value {
    json!({
        "id": building.id,
        "height_m": building.height_m(),
        "height_top_m": building.height_top_m,
        "height_ground_m": building.height_ground_m,
        "footprint_area_m2": building.footprint_area_m2(),
        "volume_m3": building.volume_m3(),
    })
}

#[derive(Debug, Clone)]
pub struct ExportEncoder {
    max_features: usize,
}

impl ExportEncoder {
    pub fn new(max_features: usize) -> Self {
        ExportEncoder {
            max_features: max_features.max(1),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.max_features)
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    // Converts and wraps up to the cap; `total` is how many were offered
    fn assemble(
        &self,
        prefix: &str,
        total: usize,
        features: impl Iterator<Item = (Geometry<f64>, Value)>,
    ) -> Result<ExportArtifact> {
        let written = features
            .take(self.max_features)
            .map(|(geometry, properties)| {
                unproject_geometry(&geometry).map(|geographic| feature(&geographic, properties))
            })
            .collect::<Result<Vec<Value>>>()?;

        let id = make_artifact_id(prefix);
        let feature_count = written.len();
        let truncated = total > feature_count;
        if truncated {
            debug!(artifact = %id, total, written = feature_count, "Export truncated");
        }

        Ok(ExportArtifact {
            file_name: make_artifact_file_name(&id),
            id,
            geojson: feature_collection(written),
            feature_count,
            total_features: total,
            truncated,
        })
    }

    /// Encodes projected geometries with their properties, in the given order.
    pub fn encode(&self, prefix: &str, features: Vec<(Geometry<f64>, Value)>) -> Result<ExportArtifact> {
        let total = features.len();
        self.assemble(prefix, total, features.into_iter())
    }

    /// Matched buildings of a query, in catalog order.
    pub fn encode_buildings(&self, result: &QueryResult) -> Result<ExportArtifact> {
        let features = result.buildings().map(|b| {
            (
                Geometry::MultiPolygon(b.footprint.clone()),
                building_properties(b),
            )
        });
        self.assemble("buildings", result.len(), features)
    }

    /// The buffer outline as a single feature.
    pub fn encode_buffer(&self, buffer: &Buffer) -> Result<ExportArtifact> {
        let properties = json!({ "name": "buffer", "radius_m": buffer.radius_m });
        self.assemble(
            "buffer",
            1,
            std::iter::once((Geometry::Polygon(buffer.outline()), properties)),
        )
    }

    pub fn encode_building(&self, building: &Building) -> Result<ExportArtifact> {
        self.assemble(
            "building",
            1,
            std::iter::once((
                Geometry::MultiPolygon(building.footprint.clone()),
                building_properties(building),
            )),
        )
    }
}

/// Destination for export artifacts.
///
/// Implementations must be thread-safe; the dispatch layer may share one sink
/// between concurrent requests.
pub trait ArtifactSink: Send + Sync {
    /// Hands the artifact off and returns the URL it can be fetched from.
    fn publish(&self, artifact: &ExportArtifact) -> Result<String>;
}

/// Writes artifacts into a directory served elsewhere under `url_prefix`.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    output_dir: PathBuf,
    url_prefix: String,
}

impl FsArtifactSink {
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        FsArtifactSink {
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into(),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(&config.output_dir, &config.url_prefix)
    }
}

impl ArtifactSink for FsArtifactSink {
    fn publish(&self, artifact: &ExportArtifact) -> Result<String> {
        let path = self.output_dir.join(&artifact.file_name);
        let write_err = |source: std::io::Error| EngineError::ArtifactWrite {
            path: path.clone(),
            source: Arc::new(source),
        };

        std::fs::create_dir_all(&self.output_dir).map_err(write_err)?;
        let mut writer = BufWriter::new(File::create(&path).map_err(write_err)?);
        serde_json::to_writer(&mut writer, &artifact.geojson)
            .map_err(|e| write_err(e.into()))?;
        writer.flush().map_err(write_err)?;

        info!(
            artifact = %artifact.id,
            path = %path.display(),
            features = artifact.feature_count,
            truncated = artifact.truncated,
            "Artifact written"
        );
        Ok(format!(
            "{}/{}",
            self.url_prefix.trim_end_matches('/'),
            artifact.file_name
        ))
    }
}

/// Keeps artifacts in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    artifacts: Mutex<HashMap<String, ExportArtifact>>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ExportArtifact> {
        self.artifacts.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn publish(&self, artifact: &ExportArtifact) -> Result<String> {
        self.artifacts
            .lock()
            .insert(artifact.id.clone(), artifact.clone());
        Ok(format!("memory://{}", artifact.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::to_projected;
    use geo_types::{polygon, MultiPolygon, Point};
    use uuid::Uuid;

    fn projected_square(x: f64, y: f64) -> Geometry<f64> {
        Geometry::MultiPolygon(MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + 20.0, y: y),
            (x: x + 20.0, y: y + 20.0),
            (x: x, y: y + 20.0),
        ]]))
    }

    #[test]
    fn test_encode_caps_and_flags_truncation() {
        let encoder = ExportEncoder::new(3);
        let features: Vec<(Geometry<f64>, Value)> = (0..5)
            .map(|i| (projected_square(130_000.0 + 100.0 * i as f64, 455_000.0), json!({ "n": i })))
            .collect();
        let artifact = encoder.encode("buildings", features).unwrap();

        assert!(artifact.truncated);
        assert_eq!(artifact.feature_count, 3);
        assert_eq!(artifact.total_features, 5);
        let written = artifact.geojson["features"].as_array().unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(written[0]["properties"]["n"], 0);
        assert_eq!(written[2]["properties"]["n"], 2);
    }

    #[test]
    fn test_encode_writes_geographic_coordinates() {
        let encoder = ExportEncoder::new(10);
        let artifact = encoder
            .encode("x", vec![(projected_square(130_000.0, 455_000.0), json!({}))])
            .unwrap();
        assert!(!artifact.truncated);
        let first = &artifact.geojson["features"][0]["geometry"]["coordinates"][0][0][0];
        let lon = first[0].as_f64().unwrap();
        let lat = first[1].as_f64().unwrap();
        assert!((lon - 5.02248).abs() < 1e-4);
        assert!((lat - 52.08270).abs() < 1e-4);
    }

    #[test]
    fn test_artifact_identity() {
        let encoder = ExportEncoder::new(10);
        let artifact = encoder.encode("buffer", Vec::new()).unwrap();
        assert!(artifact.id.starts_with("buffer_"));
        assert_eq!(artifact.file_name, format!("{}.geojson", artifact.id));
        assert_eq!(artifact.geojson["type"], "FeatureCollection");
    }

    #[test]
    fn test_building_properties_serialize_nulls() {
        let building = Building::new(
            "0344100000031296",
            MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0)]]),
            None,
            None,
            None,
            None,
        );
        let props = building_properties(&building);
        assert_eq!(props["id"], "0344100000031296");
        assert!(props["height_m"].is_null());
        assert!(props["volume_m3"].is_null());
        assert_eq!(props["footprint_area_m2"], 50.0);
    }

    #[test]
    fn test_encode_buffer_feature() {
        let buffer = Buffer {
            center: to_projected(5.1214, 52.0907).unwrap(),
            lon: 5.1214,
            lat: 52.0907,
            radius_m: 400.0,
        };
        let artifact = ExportEncoder::new(10).encode_buffer(&buffer).unwrap();
        let f = &artifact.geojson["features"][0];
        assert_eq!(f["properties"]["name"], "buffer");
        assert_eq!(f["properties"]["radius_m"], 400.0);
        assert_eq!(f["geometry"]["type"], "Polygon");
    }

    #[test]
    fn test_fs_sink_writes_file_and_returns_url() {
        let dir = std::env::temp_dir().join(format!("bouwbot_out_{}", Uuid::new_v4().simple()));
        let sink = FsArtifactSink::new(&dir, "/output/");
        let artifact = ExportEncoder::new(10)
            .encode("buildings", vec![(Geometry::Point(Point::new(130_000.0, 455_000.0)), json!({}))])
            .unwrap();

        let url = sink.publish(&artifact).unwrap();
        assert_eq!(url, format!("/output/{}", artifact.file_name));

        let written: Value =
            serde_json::from_slice(&std::fs::read(dir.join(&artifact.file_name)).unwrap()).unwrap();
        assert_eq!(written, artifact.geojson);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_fs_sink_reports_write_failure() {
        let file = std::env::temp_dir().join(format!("bouwbot_blocker_{}", Uuid::new_v4().simple()));
        std::fs::write(&file, b"not a directory").unwrap();
        let sink = FsArtifactSink::new(&file, "/output");
        let artifact = ExportEncoder::new(10).encode("x", Vec::new()).unwrap();
        let err = sink.publish(&artifact).unwrap_err();
        assert_eq!(err.reason(), "artifact_write");
        std::fs::remove_file(file).ok();
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryArtifactSink::new();
        let artifact = ExportEncoder::new(10).encode("x", Vec::new()).unwrap();
        let url = sink.publish(&artifact).unwrap();
        assert_eq!(url, format!("memory://{}", artifact.id));
        assert_eq!(sink.get(&artifact.id), Some(artifact));
        assert_eq!(sink.len(), 1);
    }
}
