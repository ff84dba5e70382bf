// R-tree over footprint bounding boxes; a candidate filter only.

use geo::BoundingRect;
use geo_types::{MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

// Bounding box of one catalog entry
#[derive(Debug, Clone)]
struct FootprintEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for FootprintEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn rect_to_aabb(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Spatial index keyed by position in the catalog.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<FootprintEnvelope>,
}

impl SpatialIndex {
    /// Bulk-loads envelopes for the given footprints, in catalog order.
    pub fn build<'a>(footprints: impl Iterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let entries: Vec<FootprintEnvelope> = footprints
            .enumerate()
            .filter_map(|(index, footprint)| {
                footprint.bounding_rect().map(|rect| FootprintEnvelope {
                    index,
                    envelope: rect_to_aabb(&rect),
                })
            })
            .collect();
        SpatialIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Catalog indices whose envelope intersects `rect`, ascending.
    pub fn candidates_intersecting(&self, rect: &Rect<f64>) -> Vec<usize> {
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&rect_to_aabb(rect))
            .map(|entry| entry.index)
            .collect();
        hits.sort_unstable();
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, polygon};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]])
    }

    #[test]
    fn test_candidates_are_sorted_and_filtered() {
        let footprints = vec![
            square(100.0, 100.0, 10.0),
            square(0.0, 0.0, 10.0),
            square(5000.0, 5000.0, 10.0),
            square(50.0, 50.0, 10.0),
        ];
        let index = SpatialIndex::build(footprints.iter());
        assert_eq!(index.len(), 4);

        let query = Rect::new(coord! { x: -1.0, y: -1.0 }, coord! { x: 200.0, y: 200.0 });
        assert_eq!(index.candidates_intersecting(&query), vec![0, 1, 3]);
    }

    #[test]
    fn test_touching_envelope_is_a_candidate() {
        let footprints = vec![square(10.0, 0.0, 10.0)];
        let index = SpatialIndex::build(footprints.iter());
        let query = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 10.0, y: 10.0 });
        assert_eq!(index.candidates_intersecting(&query), vec![0]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(std::iter::empty());
        assert!(index.is_empty());
        let query = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        assert!(index.candidates_intersecting(&query).is_empty());
    }
}
