// Owned engine state: configuration plus the catalog and boundary, each loaded on
// first use. Concurrent first callers wait on one init lock and share the outcome.
// A failed load is sticky: the instance keeps reporting the same error without
// touching the source again.

use crate::catalog::CatalogStore;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::region::RegionBoundary;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use tracing::error;

type LoadSlot<T> = OnceLock<Result<Arc<T>>>;

pub struct EngineContext {
    config: EngineConfig,
    catalog: LoadSlot<CatalogStore>,
    boundary: LoadSlot<RegionBoundary>,
    // Serializes first-time loads
    init_lock: Mutex<()>,
}

// Double-checked load into a once slot; success and failure are both kept.
fn get_or_load<T>(
    slot: &LoadSlot<T>,
    init_lock: &Mutex<()>,
    what: &'static str,
    load: impl FnOnce() -> Result<T>,
) -> Result<Arc<T>> {
    if let Some(outcome) = slot.get() {
        return outcome.clone();
    }

    let _guard = init_lock.lock();
    slot.get_or_init(|| match load() {
        Ok(value) => Ok(Arc::new(value)),
        Err(e) => {
            error!(resource = what, error = %e, "Failed to load engine data");
            Err(e)
        }
    })
    .clone()
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        EngineContext {
            config,
            catalog: OnceLock::new(),
            boundary: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    /// Context whose catalog and boundary are already in memory.
    pub fn preloaded(config: EngineConfig, catalog: CatalogStore, boundary: RegionBoundary) -> Self {
        let context = Self::new(config);
        let _ = context.catalog.set(Ok(Arc::new(catalog)));
        let _ = context.boundary.set(Ok(Arc::new(boundary)));
        context
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> Result<Arc<CatalogStore>> {
        get_or_load(&self.catalog, &self.init_lock, "catalog", || {
            CatalogStore::load(&self.config.catalog)
        })
    }

    pub fn boundary(&self) -> Result<Arc<RegionBoundary>> {
        get_or_load(&self.boundary, &self.init_lock, "boundary", || {
            RegionBoundary::load(&self.config.boundary)
        })
    }

    pub fn is_catalog_loaded(&self) -> bool {
        matches!(self.catalog.get(), Some(Ok(_)))
    }

    /// True once a catalog load has been attempted and failed.
    pub fn is_catalog_failed(&self) -> bool {
        matches!(self.catalog.get(), Some(Err(_)))
    }
}
