//! KD-tree accelerated neighbor search for 3D point sets.
//!
//! The tree answers radius and nearest-neighbor queries over an immutable
//! point set. Radius hits come back sorted by distance, so the ball query
//! re-sorts them by index to reproduce the brute-force storage order.
//!
//! # Usage
//!
//! ```ignore
//! let search = PointSearch::from_points(&points).expect("3D points");
//! let nearby = search.within(&[0.0, 0.0, 0.0], 1.5);
//! let (nearest, dist_sq) = search.nearest(&[0.2, 0.1, 0.0]);
//! ```

use kiddo::immutable::float::kdtree::ImmutableKdTree;
use kiddo::SquaredEuclidean;
use rayon::prelude::*;

use super::cpu::pad_row;
use super::validate_ball_query;
use crate::error::{PointOpsError, Result};
use crate::types::{squared_distance, NeighborTable, PointSet};

/// Bucket size for the KD-tree.
///
/// Larger than the kiddo default so planar or gridded clouds with many
/// equal coordinates on one axis still split.
const BUCKET_SIZE: usize = 256;

/// KD-tree over the points of a three-dimensional `PointSet`.
#[derive(Debug)]
pub struct PointSearch {
    /// Generic args: A=f32 (coordinate), T=u64 (item index), K=3, B=bucket size
    kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE>,
}

impl PointSearch {
    /// Build a search index. Item `i` of the tree is point `i` of the set.
    ///
    /// Returns `None` unless the set is three-dimensional.
    pub fn from_points(points: &PointSet) -> Option<Self> {
        let rows = points.to_rows3()?;
        let kdtree: ImmutableKdTree<f32, u64, 3, BUCKET_SIZE> = (&*rows).into();
        Some(Self { kdtree })
    }

    /// Indices of points within `radius` of `point`, nearest first.
    pub fn within(&self, point: &[f32; 3], radius: f32) -> Vec<usize> {
        self.kdtree
            .within::<SquaredEuclidean>(point, radius * radius)
            .iter()
            .map(|nn| nn.item as usize)
            .collect()
    }

    /// Nearest point index and its squared distance.
    pub fn nearest(&self, point: &[f32; 3]) -> (usize, f32) {
        let nn = self.kdtree.nearest_one::<SquaredEuclidean>(point);
        (nn.item as usize, nn.distance)
    }

    pub fn len(&self) -> usize {
        self.kdtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.kdtree.size() == 0
    }
}

/// Ball query answered through a prebuilt [`PointSearch`].
///
/// Produces exactly the same table as [`super::ball_query_cpu`]: the tree
/// is probed with a slightly widened radius, hits are re-checked with the
/// exact squared distance and then ordered by index.
pub fn ball_query_kdtree(
    search: &PointSearch,
    points: &PointSet,
    queries: &PointSet,
    radius: f32,
    k: usize,
) -> Result<NeighborTable> {
    validate_ball_query(points, queries, radius, k)?;
    if search.len() != points.len() {
        return Err(PointOpsError::invalid(format!(
            "search index holds {} points but the point set has {}",
            search.len(),
            points.len()
        )));
    }

    let radius_sq = radius * radius;
    let probe_sq = radius_sq * 1.0001 + 1e-6;
    let num_queries = queries.len();

    let mut indices = vec![0u32; num_queries * k];
    let mut counts = vec![0u32; num_queries];

    indices
        .par_chunks_mut(k)
        .zip(counts.par_iter_mut())
        .zip(queries.as_flat().par_chunks(3))
        .for_each(|((row, count), query)| {
            let q = [query[0], query[1], query[2]];

            let mut hits: Vec<u32> = search
                .kdtree
                .within::<SquaredEuclidean>(&q, probe_sq)
                .iter()
                .map(|nn| nn.item as usize)
                .filter(|&i| squared_distance(query, points.point(i)) <= radius_sq)
                .map(|i| i as u32)
                .collect();
            hits.sort_unstable();

            let found = hits.len().min(k);
            row[..found].copy_from_slice(&hits[..found]);
            pad_row(row, found);
            *count = found as u32;
        });

    Ok(NeighborTable::from_parts(indices, counts, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ball_query::ball_query_cpu;
    use crate::test_utils::{make_cube_grid, make_random_sphere};

    #[test]
    fn test_search_requires_3d() {
        let points = PointSet::from_rows(&[[0.0, 0.0]]).unwrap();
        assert!(PointSearch::from_points(&points).is_none());
    }

    #[test]
    fn test_search_single_point() {
        let points = PointSet::from_rows(&[[5.0, 5.0, 5.0]]).unwrap();
        let search = PointSearch::from_points(&points).unwrap();
        assert_eq!(search.len(), 1);

        assert_eq!(search.within(&[5.0, 5.0, 5.0], 1.0), vec![0]);
        assert!(search.within(&[100.0, 100.0, 100.0], 1.0).is_empty());
    }

    #[test]
    fn test_search_nearest() {
        let points =
            PointSet::from_rows(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [10.0, 0.0, 0.0]]).unwrap();
        let search = PointSearch::from_points(&points).unwrap();

        let (idx, dist_sq) = search.nearest(&[9.0, 0.5, 0.0]);
        assert_eq!(idx, 2);
        assert!((dist_sq - 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_kdtree_ball_query_matches_brute_force() {
        let rows = make_random_sphere([0.0, 0.0, 0.0], 5.0, 2000, 99);
        let points = PointSet::from_rows(&rows).unwrap();
        let queries =
            PointSet::from_rows(&make_random_sphere([0.5, 0.0, -0.5], 6.0, 200, 100)).unwrap();
        let search = PointSearch::from_points(&points).unwrap();

        for (radius, k) in [(0.3, 4), (1.0, 16), (2.5, 64)] {
            let expected = ball_query_cpu(&points, &queries, radius, k).unwrap();
            let actual = ball_query_kdtree(&search, &points, &queries, radius, k).unwrap();
            assert_eq!(actual, expected, "radius {radius}, k {k}");
        }
    }

    #[test]
    fn test_kdtree_ball_query_rejects_foreign_index() {
        let larger =
            PointSet::from_rows(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]]).unwrap();
        let search = PointSearch::from_points(&larger).unwrap();
        let points = PointSet::from_rows(&[[0.0, 0.0, 0.0]]).unwrap();
        let queries = PointSet::from_rows(&[[2.0, 0.0, 0.0]]).unwrap();

        assert!(matches!(
            ball_query_kdtree(&search, &points, &queries, 5.0, 4),
            Err(PointOpsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_kdtree_ball_query_on_grid_boundaries() {
        // Grid spacing equals the radius: face neighbours sit exactly on the boundary.
        let rows = make_cube_grid(4.0, 1.0, [0.0, 0.0, 0.0]);
        let points = PointSet::from_rows(&rows).unwrap();
        let queries = PointSet::from_rows(&[[2.0, 2.0, 2.0], [0.0, 0.0, 0.0]]).unwrap();
        let search = PointSearch::from_points(&points).unwrap();

        let expected = ball_query_cpu(&points, &queries, 1.0, 8).unwrap();
        let actual = ball_query_kdtree(&search, &points, &queries, 1.0, 8).unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.count(0), 7); // center + 6 face neighbours
        assert_eq!(actual.count(1), 4); // corner + 3 face neighbours
    }
}
