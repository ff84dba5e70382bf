// Engine configuration types.
// Every field has a default matching the Utrecht deployment, so a partial JSON
// file only needs to name what differs.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest accepted buffer radius in meters.
pub const MAX_RADIUS_M: f64 = 15_000.0;

/// Hard cap on features written to one export artifact.
pub const MAX_EXPORT_FEATURES: usize = 5000;

/// Radius used when a request does not name one.
pub const DEFAULT_RADIUS_M: f64 = 400.0;

/// Height threshold used when a request does not name one.
pub const DEFAULT_MIN_HEIGHT_M: f64 = 30.0;

/// Coordinate reference system of a GeoJSON source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCrs {
    /// Amersfoort / RD New (EPSG:28992), meters.
    Projected,
    /// WGS84 longitude/latitude (EPSG:4326).
    Geographic,
    /// Read the GeoJSON `crs` member; absent means geographic.
    #[default]
    Auto,
}

/// Where and how to read the building catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// GeoJSON FeatureCollection, optionally gzip-compressed.
    pub path: PathBuf,
    pub source_crs: SourceCrs,

    /// Property holding the stable building identifier.
    pub id_property: String,

    /// Height of the highest ridge line.
    pub height_top_property: String,

    /// Ground level elevation.
    pub height_ground_property: String,

    /// Ground floor area in m².
    pub footprint_property: String,

    /// Volume properties in m³, most preferred first.
    pub volume_properties: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("static/data/utrecht_pand.geojson"),
            source_crs: SourceCrs::Auto,
            id_property: "identificatie".to_string(),
            height_top_property: "b3_h_nok".to_string(),
            height_ground_property: "b3_h_maaiveld".to_string(),
            footprint_property: "b3_opp_grond".to_string(),
            volume_properties: vec![
                "b3_volume_lod22".to_string(),
                "b3_volume_lod13".to_string(),
                "b3_volume_lod12".to_string(),
            ],
        }
    }
}

/// Where to read the service area polygon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub path: PathBuf,
    pub source_crs: SourceCrs,

    /// Human-readable name used in out-of-area messages.
    pub service_area_name: String,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("static/data/utrecht.geojson"),
            source_crs: SourceCrs::Auto,
            service_area_name: "Utrecht".to_string(),
        }
    }
}

/// Export artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub max_features: usize,

    /// Directory the filesystem sink writes into.
    pub output_dir: PathBuf,

    /// URL prefix under which the external file server exposes `output_dir`.
    pub url_prefix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_features: MAX_EXPORT_FEATURES,
            output_dir: PathBuf::from("output"),
            url_prefix: "/output".to_string(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub catalog: CatalogConfig,
    pub boundary: BoundaryConfig,
    pub export: ExportConfig,
    pub max_radius_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            boundary: BoundaryConfig::default(),
            export: ExportConfig::default(),
            max_radius_m: MAX_RADIUS_M,
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no query could satisfy.
    pub fn validate(&self) -> Result<()> {
        if !self.max_radius_m.is_finite() || self.max_radius_m <= 0.0 {
            return Err(EngineError::Config(format!(
                "max_radius_m must be positive, got {}",
                self.max_radius_m
            )));
        }
        if self.export.max_features == 0 {
            return Err(EngineError::Config(
                "export.max_features must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog.path = path.into();
        self
    }

    pub fn with_boundary_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.boundary.path = path.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export.output_dir = dir.into();
        self
    }

    pub fn with_max_export_features(mut self, max_features: usize) -> Self {
        self.export.max_features = max_features;
        self
    }
}
