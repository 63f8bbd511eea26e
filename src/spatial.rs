//! R-tree indexed points and radius queries in meters.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geo_utils::{meters_to_degrees, point_distance};
use crate::GpsPoint;

/// A GPS point with its index for R-tree queries
#[derive(Debug, Clone, Copy)]
pub struct IndexedPoint {
    pub idx: usize,
    pub lat: f64,
    pub lng: f64,
}

impl IndexedPoint {
    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.lat, self.lng)
    }
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlng = self.lng - point[1];
        dlat * dlat + dlng * dlng
    }
}

/// Build R-tree from GPS points for efficient spatial queries
pub fn build_rtree(points: &[GpsPoint]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = points
        .iter()
        .enumerate()
        .map(|(i, p)| IndexedPoint {
            idx: i,
            lat: p.latitude,
            lng: p.longitude,
        })
        .collect();
    RTree::bulk_load(indexed)
}

/// Point set answering "is anything within N meters of here?" exactly.
///
/// The R-tree narrows the search to a padded degree box; every hit is
/// confirmed with the haversine distance. Queries whose box would cross
/// the antimeridian or reach a pole fall back to a linear scan.
pub struct PointIndex {
    points: Vec<GpsPoint>,
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(points: Vec<GpsPoint>) -> Self {
        let tree = build_rtree(&points);
        Self { points, tree }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True if any indexed point lies within `meters` of `query`.
    pub fn any_within(&self, query: &GpsPoint, meters: f64) -> bool {
        let spans = meters_to_degrees(meters, query.latitude).filter(|&(_, dlng)| {
            query.longitude - dlng >= -180.0 && query.longitude + dlng <= 180.0
        });

        match spans {
            Some((dlat, dlng)) => {
                let envelope = AABB::from_corners(
                    [query.latitude - dlat, query.longitude - dlng],
                    [query.latitude + dlat, query.longitude + dlng],
                );
                self.tree
                    .locate_in_envelope(&envelope)
                    .any(|p| point_distance(&p.point(), query) <= meters)
            }
            None => self
                .points
                .iter()
                .any(|p| point_distance(p, query) <= meters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rtree_nearest() {
        let points = vec![GpsPoint::new(50.0, 30.0), GpsPoint::new(51.0, 31.0)];
        let tree = build_rtree(&points);
        let nearest = tree.nearest_neighbor(&[50.9, 30.9]).unwrap();
        assert_eq!(nearest.idx, 1);
    }

    #[test]
    fn test_any_within() {
        let index = PointIndex::new(vec![GpsPoint::new(50.0, 30.0)]);
        // ~111 m north
        let query = GpsPoint::new(50.001, 30.0);
        assert!(index.any_within(&query, 150.0));
        assert!(!index.any_within(&query, 100.0));
    }

    #[test]
    fn test_any_within_across_antimeridian() {
        let index = PointIndex::new(vec![GpsPoint::new(0.0, 179.9995)]);
        let query = GpsPoint::new(0.0, -179.9995);
        // ~111 m apart across the date line
        assert!(index.any_within(&query, 150.0));
    }

    #[test]
    fn test_empty_index() {
        let index = PointIndex::new(vec![]);
        assert!(index.is_empty());
        assert!(!index.any_within(&GpsPoint::new(0.0, 0.0), 1_000.0));
    }
}
