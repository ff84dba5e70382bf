// This is the models module containing the payloads returned to callers
use crate::error::EngineError;
use crate::stats::{SummaryStats, VolumeStats};
use serde::{Deserialize, Serialize};

/// One thing for the map client to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MapLayer {
    Marker { lat: f64, lon: f64, label: String },
    GeojsonUrl { name: String, url: String },
}

impl MapLayer {
    pub fn marker(lon: f64, lat: f64, label: impl Into<String>) -> Self {
        MapLayer::Marker {
            lat,
            lon,
            label: label.into(),
        }
    }

    pub fn geojson_url(name: impl Into<String>, url: impl Into<String>) -> Self {
        MapLayer::GeojsonUrl {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Map instructions. `center` is `[lat, lon]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    pub center: [f64; 2],
    pub zoom: u8,
    pub layers: Vec<MapLayer>,
}

impl MapView {
    pub fn new(lon: f64, lat: f64, zoom: u8) -> Self {
        MapView {
            center: [lat, lon],
            zoom,
            layers: Vec::new(),
        }
    }

    pub fn with_layer(mut self, layer: MapLayer) -> Self {
        self.layers.push(layer);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseStats {
    Summary(SummaryStats),
    Volume(VolumeStats),
}

/// The tallest building, located by a point inside its footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallestBuilding {
    pub id: String,
    pub height_m: f64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySuccess {
    pub ok: bool,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_in_buffer: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ResponseStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tallest: Option<TallestBuilding>,
    pub truncated: bool,
    pub summary: String,
    pub map: MapView,
}

impl QuerySuccess {
    pub fn new(count: usize, summary: impl Into<String>, map: MapView) -> Self {
        QuerySuccess {
            ok: true,
            count,
            total_in_buffer: None,
            min_height_m: None,
            stats: None,
            tallest: None,
            truncated: false,
            summary: summary.into(),
            map,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFailure {
    pub ok: bool,
    pub reason: String,
    pub message: String,
}

impl From<&EngineError> for QueryFailure {
    fn from(error: &EngineError) -> Self {
        QueryFailure {
            ok: false,
            reason: error.reason().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Success(QuerySuccess),
    Failure(QueryFailure),
}

impl QueryResponse {
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryResponse::Success(_))
    }

    pub fn success(&self) -> Option<&QuerySuccess> {
        match self {
            QueryResponse::Success(s) => Some(s),
            QueryResponse::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&QueryFailure> {
        match self {
            QueryResponse::Failure(f) => Some(f),
            QueryResponse::Success(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "ok": false, "reason": "serialization", "message": e.to_string() })
        })
    }
}
