// Place-name resolution. Only an in-memory table ships here; network geocoders
// plug in behind the same trait.

use crate::cache_keys::normalize_place_key;
use crate::crs::validate_geographic;
use crate::error::Result;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("could not resolve place: {0}")]
    NotFound(String),
}

/// Turns a free-text place name into a WGS84 `(lon, lat)`.
pub trait PlaceResolver: Send + Sync {
    fn resolve(&self, place: &str) -> std::result::Result<(f64, f64), ResolveError>;
}

/// Fixed table of places, matched after normalization.
#[derive(Debug, Clone, Default)]
pub struct StaticGazetteer {
    places: HashMap<String, (f64, f64)>,
}

impl StaticGazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a place. Rejects out-of-range coordinates.
    pub fn insert(&mut self, place: &str, lon: f64, lat: f64) -> Result<()> {
        validate_geographic(lon, lat)?;
        self.places.insert(normalize_place_key(place), (lon, lat));
        Ok(())
    }

    pub fn with_place(mut self, place: &str, lon: f64, lat: f64) -> Result<Self> {
        self.insert(place, lon, lat)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

impl PlaceResolver for StaticGazetteer {
    fn resolve(&self, place: &str) -> std::result::Result<(f64, f64), ResolveError> {
        self.places
            .get(&normalize_place_key(place))
            .copied()
            .ok_or_else(|| ResolveError::NotFound(place.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_normalized_names() {
        let gazetteer = StaticGazetteer::new()
            .with_place("Domtoren", 5.1213, 52.0907)
            .unwrap()
            .with_place("Utrecht Centraal", 5.1100, 52.0894)
            .unwrap();
        assert_eq!(gazetteer.len(), 2);
        assert_eq!(gazetteer.resolve("  domtoren ").unwrap(), (5.1213, 52.0907));
        assert_eq!(gazetteer.resolve("UTRECHT   centraal").unwrap(), (5.1100, 52.0894));
    }

    #[test]
    fn test_unknown_place() {
        let gazetteer = StaticGazetteer::new();
        assert_eq!(
            gazetteer.resolve(" Atlantis "),
            Err(ResolveError::NotFound("Atlantis".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_coordinates() {
        let mut gazetteer = StaticGazetteer::new();
        assert!(gazetteer.insert("nowhere", 200.0, 52.0).is_err());
        assert!(gazetteer.is_empty());
    }
}
