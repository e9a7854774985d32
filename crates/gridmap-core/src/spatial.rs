use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry::{Envelope, Point};
use crate::layer::LayerId;

/// An entry in the R-tree spatial index, referencing a layer by its id.
#[derive(Debug, Clone)]
pub struct LayerEntry {
    pub layer_id: LayerId,
    /// World extent of the layer.
    pub bounds: Envelope,
}

impl RTreeObject for LayerEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min.x, self.bounds.min.y],
            [self.bounds.max.x, self.bounds.max.y],
        )
    }
}

impl PointDistance for LayerEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        rstar::Envelope::distance_2(&self.envelope(), point)
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        rstar::Envelope::contains_point(&self.envelope(), point)
    }
}

/// Spatial index over layer extents, used to cull layers outside the viewport.
pub struct LayerIndex {
    tree: RTree<LayerEntry>,
}

impl LayerIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Build the index from a list of layer extents.
    pub fn build(entries: Vec<LayerEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn insert(&mut self, entry: LayerEntry) {
        self.tree.insert(entry);
    }

    /// Layers whose extent contains the given point.
    pub fn query_point(&self, point: &Point) -> Vec<LayerId> {
        self.tree
            .locate_all_at_point(&[point.x, point.y])
            .map(|e| e.layer_id)
            .collect()
    }

    /// Layers whose extent intersects the given envelope.
    pub fn query_envelope(&self, envelope: &Envelope) -> Vec<LayerId> {
        let query = AABB::from_corners(
            [envelope.min.x, envelope.min.y],
            [envelope.max.x, envelope.max.y],
        );
        self.tree
            .locate_in_envelope_intersecting(&query)
            .map(|e| e.layer_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for LayerIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::CoordinateSystem;
    use uuid::Uuid;

    #[test]
    fn test_spatial_query() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let crs = CoordinateSystem::web_mercator();
        let index = LayerIndex::build(vec![
            LayerEntry {
                layer_id: a,
                bounds: Envelope::new(0.0, 0.0, 10.0, 10.0, crs.clone()),
            },
            LayerEntry {
                layer_id: b,
                bounds: Envelope::new(20.0, 20.0, 30.0, 30.0, crs.clone()),
            },
        ]);
        assert_eq!(index.len(), 2);

        assert_eq!(index.query_point(&Point::new(5.0, 5.0)), vec![a]);
        assert_eq!(index.query_point(&Point::new(25.0, 25.0)), vec![b]);
        assert!(index.query_point(&Point::new(15.0, 15.0)).is_empty());

        let viewport = Envelope::new(-5.0, -5.0, 15.0, 15.0, crs);
        assert_eq!(index.query_envelope(&viewport), vec![a]);
    }

    #[test]
    fn test_point_on_extent_edge() {
        let id = Uuid::new_v4();
        let entry = LayerEntry {
            layer_id: id,
            bounds: Envelope::new(0.0, 0.0, 10.0, 10.0, CoordinateSystem::undefined()),
        };
        assert!(entry.contains_point(&[10.0, 5.0]));
        assert!(!entry.contains_point(&[10.5, 5.0]));
        assert_eq!(entry.distance_2(&[13.0, 14.0]), 25.0);
        assert_eq!(entry.distance_2(&[5.0, 5.0]), 0.0);

        let index = LayerIndex::build(vec![entry]);
        assert_eq!(index.query_point(&Point::new(0.0, 10.0)), vec![id]);
    }

    #[test]
    fn test_insert_into_empty_index() {
        let mut index = LayerIndex::default();
        assert!(index.is_empty());
        let id = Uuid::new_v4();
        index.insert(LayerEntry {
            layer_id: id,
            bounds: Envelope::new(0.0, 0.0, 1.0, 1.0, CoordinateSystem::undefined()),
        });
        assert_eq!(index.query_point(&Point::new(0.5, 0.5)), vec![id]);
    }
}
