// Building-footprint query engine for a single service area: loads a catalog of
// footprints once, answers buffer queries and exports capped GeoJSON for a map client.

// Import our error types
pub mod error;
// Import our configuration layer
pub mod config;
// Import our logging setup
pub mod logging;
// Import our coordinate conversion module
pub mod crs;
// Import our geojson features module
pub mod geojson_features;
// Import our footprint geometry helpers
pub mod geometry;
// Import our spatial index
pub mod index;
// Import our building catalog
pub mod catalog;
// Import our service area boundary
pub mod region;
// Import our module state
pub mod context;
// Import our reductions
pub mod stats;
// Import our query engine
pub mod query;
// Import GeoJSON export functionality
pub mod export;
// Import our models
pub mod models;
// Import request dispatch
pub mod dispatch;
// Import place resolution
pub mod gazetteer;
mod cache_keys;


pub use catalog::{Building, CatalogStore, LoadReport};
pub use config::{BoundaryConfig, CatalogConfig, EngineConfig, ExportConfig, SourceCrs};
pub use context::EngineContext;
pub use crs::{to_geographic, to_projected};
pub use dispatch::{QueryRequest, QueryService};
pub use error::{EngineError, Result};
pub use export::{ArtifactSink, ExportArtifact, ExportEncoder, FsArtifactSink, MemoryArtifactSink};
pub use gazetteer::{PlaceResolver, ResolveError, StaticGazetteer};
pub use index::SpatialIndex;
pub use models::{MapLayer, MapView, QueryFailure, QueryResponse, QuerySuccess};
pub use query::{Buffer, QueryEngine, QueryResult};
pub use region::RegionBoundary;
pub use stats::{SummaryStats, VolumeStats};
