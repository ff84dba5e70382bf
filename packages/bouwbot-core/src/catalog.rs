// Building catalog: loads footprints once, derives attributes and builds the index.

use crate::config::{CatalogConfig, SourceCrs};
use crate::crs::project_multi_polygon;
use crate::error::{EngineError, Result};
use crate::geojson_features::{
    id_value, number_value, polygonal_from_value, read_feature_collection, resolve_crs,
    RawFeature, RawFeatureCollection,
};
use crate::geometry::prepare_footprint;
use crate::index::SpatialIndex;
use geo::Area;
use geo_types::MultiPolygon;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One building record. Footprint is in the projected frame (meters).
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub id: String,
    pub footprint: MultiPolygon<f64>,
    pub height_top_m: Option<f64>,
    pub height_ground_m: Option<f64>,
    height_m: Option<f64>,
    footprint_area_m2: f64,
    volume_m3: Option<f64>,
}

impl Building {
    /// Builds a record and derives its attributes.
    ///
    /// `footprint_area_m2` and `volume_m3` are the raw source values; invalid or
    /// missing ones fall back to the footprint area and `area × height`.
    pub fn new(
        id: impl Into<String>,
        footprint: MultiPolygon<f64>,
        height_top_m: Option<f64>,
        height_ground_m: Option<f64>,
        footprint_area_m2: Option<f64>,
        volume_m3: Option<f64>,
    ) -> Self {
        let height_m = match (height_top_m, height_ground_m) {
            (Some(top), Some(ground)) => Some(top - ground).filter(|h| h.is_finite() && *h >= 0.0),
            _ => None,
        };
        let footprint_area_m2 = footprint_area_m2
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or_else(|| footprint.unsigned_area());
        let volume_m3 = volume_m3
            .filter(|v| v.is_finite() && *v >= 0.0)
            .or_else(|| height_m.map(|h| footprint_area_m2 * h));

        Building {
            id: id.into(),
            footprint,
            height_top_m,
            height_ground_m,
            height_m,
            footprint_area_m2,
            volume_m3,
        }
    }

    /// Top minus ground height; absent when either input is missing or the result is negative.
    pub fn height_m(&self) -> Option<f64> {
        self.height_m
    }

    pub fn footprint_area_m2(&self) -> f64 {
        self.footprint_area_m2
    }

    pub fn volume_m3(&self) -> Option<f64> {
        self.volume_m3
    }
}

/// Counts gathered while loading a catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub read: usize,
    pub loaded: usize,
    pub repaired: usize,
    pub dropped: usize,
    /// Dropped records per reason code.
    pub drop_reasons: BTreeMap<&'static str, usize>,
}

// Why a single record was skipped
#[derive(Debug)]
struct Dropped {
    kind: &'static str,
    detail: String,
}

impl Dropped {
    fn new(kind: &'static str, detail: impl ToString) -> Self {
        Dropped {
            kind,
            detail: detail.to_string(),
        }
    }
}

fn convert_record(
    position: usize,
    feature: &RawFeature,
    config: &CatalogConfig,
    crs: SourceCrs,
) -> std::result::Result<(Building, bool), Dropped> {
    let id = id_value(feature.property(&config.id_property))
        .or_else(|| id_value(feature.id.as_ref()))
        .unwrap_or_else(|| position.to_string());

    let geometry = feature
        .geometry
        .as_ref()
        .ok_or_else(|| Dropped::new("missing_geometry", &id))?;
    let footprint = polygonal_from_value(geometry)
        .map_err(|e| Dropped::new("malformed_geometry", format!("{}: {}", id, e)))?
        .ok_or_else(|| Dropped::new("not_polygonal", &id))?;

    let footprint = match crs {
        SourceCrs::Geographic => project_multi_polygon(&footprint)
            .map_err(|e| Dropped::new("projection_failed", format!("{}: {}", id, e)))?,
        SourceCrs::Projected | SourceCrs::Auto => footprint,
    };

    let prepared =
        prepare_footprint(&id, footprint).map_err(|e| Dropped::new("invalid_geometry", e))?;

    let volume = config
        .volume_properties
        .iter()
        .filter_map(|key| number_value(feature.property(key)))
        .find(|v| *v >= 0.0);

    let building = Building::new(
        id,
        prepared.footprint,
        number_value(feature.property(&config.height_top_property)),
        number_value(feature.property(&config.height_ground_property)),
        number_value(feature.property(&config.footprint_property)),
        volume,
    );
    Ok((building, prepared.repaired))
}

/// Immutable, indexed building catalog.
#[derive(Debug)]
pub struct CatalogStore {
    buildings: Vec<Building>,
    index: SpatialIndex,
    report: LoadReport,
}

impl CatalogStore {
    /// Reads and indexes the catalog named by `config`.
    pub fn load(config: &CatalogConfig) -> Result<Self> {
        let started = Instant::now();
        info!(path = %config.path.display(), "Loading building catalog");

        let collection = read_feature_collection(&config.path)?;
        let store = Self::from_features(&collection, config)?;

        info!(
            path = %config.path.display(),
            loaded = store.report.loaded,
            repaired = store.report.repaired,
            dropped = store.report.dropped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Building catalog loaded"
        );
        Ok(store)
    }

    /// Builds a catalog from an already parsed FeatureCollection.
    pub fn from_features(collection: &RawFeatureCollection, config: &CatalogConfig) -> Result<Self> {
        let crs = resolve_crs(collection, config.source_crs, &config.path)?;
        debug!(?crs, features = collection.features.len(), "Converting catalog records");

        let outcomes: Vec<std::result::Result<(Building, bool), Dropped>> = collection
            .features
            .par_iter()
            .enumerate()
            .map(|(position, feature)| convert_record(position, feature, config, crs))
            .collect();

        let mut report = LoadReport {
            read: outcomes.len(),
            ..LoadReport::default()
        };
        let mut buildings = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok((building, repaired)) => {
                    if repaired {
                        report.repaired += 1;
                    }
                    buildings.push(building);
                }
                Err(dropped) => {
                    debug!(reason = dropped.kind, detail = %dropped.detail, "Dropped catalog record");
                    report.dropped += 1;
                    *report.drop_reasons.entry(dropped.kind).or_insert(0) += 1;
                }
            }
        }
        report.loaded = buildings.len();

        if report.dropped > 0 {
            warn!(
                dropped = report.dropped,
                reasons = ?report.drop_reasons,
                "Some catalog records were dropped"
            );
        }
        if buildings.is_empty() {
            return Err(EngineError::EmptyCatalog {
                read: report.read,
                dropped: report.dropped,
            });
        }

        Ok(Self::assemble(buildings, report))
    }

    /// Builds a catalog from records whose footprints are already projected and valid.
    pub fn from_buildings(buildings: Vec<Building>) -> Result<Self> {
        if buildings.is_empty() {
            return Err(EngineError::EmptyCatalog { read: 0, dropped: 0 });
        }
        let report = LoadReport {
            read: buildings.len(),
            loaded: buildings.len(),
            ..LoadReport::default()
        };
        Ok(Self::assemble(buildings, report))
    }

    fn assemble(buildings: Vec<Building>, report: LoadReport) -> Self {
        let index = SpatialIndex::build(buildings.iter().map(|b| &b.footprint));
        CatalogStore {
            buildings,
            index,
            report,
        }
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn get(&self, index: usize) -> Option<&Building> {
        self.buildings.get(index)
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}
