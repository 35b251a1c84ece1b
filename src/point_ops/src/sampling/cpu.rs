//! CPU implementation of greedy farthest-point sampling.

use rayon::prelude::*;

use crate::types::{squared_distance, IndexSet, PointSet};

/// Points per rayon task during the distance update.
const CHUNK_SIZE: usize = 4096;

/// Below this size a single-threaded scan beats the rayon fork/join per step.
const PARALLEL_MIN_POINTS: usize = 16_384;

/// Distance value marking an already selected point.
///
/// Real squared distances are never negative, so `min` keeps the mark and
/// `argmax` never returns a selected point while unselected ones remain.
const SELECTED: f32 = -1.0;

/// Select `num_samples` point indices by greedy farthest-point sampling.
///
/// The first sample is index 0. Each following sample is the point with the
/// largest squared distance to its nearest selected point, ties broken by
/// the lowest index. Returns `min(num_samples, N)` unique indices in
/// selection order.
pub fn farthest_point_sample_cpu(points: &PointSet, num_samples: usize) -> IndexSet {
    let n = points.len();
    let m = num_samples.min(n);
    if m == 0 {
        return IndexSet::default();
    }

    let dim = points.dim();
    let flat = points.as_flat();

    let mut dist = vec![f32::INFINITY; n];
    let mut selected = Vec::with_capacity(m);

    let mut current = 0usize;
    selected.push(current as u32);
    dist[current] = SELECTED;

    for _ in 1..m {
        let anchor = points.point(current);

        let (_, next) = if n >= PARALLEL_MIN_POINTS {
            dist.par_chunks_mut(CHUNK_SIZE)
                .enumerate()
                .map(|(c, chunk)| update_chunk(chunk, c * CHUNK_SIZE, flat, dim, anchor))
                .reduce(|| (f32::NEG_INFINITY, usize::MAX), pick_farther)
        } else {
            update_chunk(&mut dist, 0, flat, dim, anchor)
        };

        current = next;
        selected.push(current as u32);
        dist[current] = SELECTED;
    }

    IndexSet::new(selected)
}

/// Fold the newest sample into `chunk` and return the chunk's farthest point.
fn update_chunk(
    chunk: &mut [f32],
    offset: usize,
    flat: &[f32],
    dim: usize,
    anchor: &[f32],
) -> (f32, usize) {
    let mut best = (f32::NEG_INFINITY, usize::MAX);

    for (j, d) in chunk.iter_mut().enumerate() {
        let i = offset + j;
        let candidate = squared_distance(&flat[i * dim..(i + 1) * dim], anchor);
        if candidate < *d {
            *d = candidate;
        }
        // Strict comparison keeps the lowest index on ties within a chunk.
        if *d > best.0 {
            best = (*d, i);
        }
    }

    best
}

/// Larger distance wins, lower index breaks ties.
fn pick_farther(a: (f32, usize), b: (f32, usize)) -> (f32, usize) {
    if b.0 > a.0 || (b.0 == a.0 && b.1 < a.1) {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_cube_grid, make_random_sphere};

    fn brute_force_fps(points: &PointSet, m: usize) -> Vec<u32> {
        // Straightforward O(M^2 N) reference: recompute nearest-selected distance every step.
        let n = points.len();
        let mut selected = vec![0usize];
        while selected.len() < m.min(n) {
            let mut best = (f32::NEG_INFINITY, usize::MAX);
            for i in 0..n {
                if selected.contains(&i) {
                    continue;
                }
                let d = selected
                    .iter()
                    .map(|&s| squared_distance(points.point(i), points.point(s)))
                    .fold(f32::INFINITY, f32::min);
                if d > best.0 {
                    best = (d, i);
                }
            }
            selected.push(best.1);
        }
        selected.into_iter().map(|i| i as u32).collect()
    }

    #[test]
    fn test_fps_line_scenario() {
        let points = PointSet::from_rows(&[[0.0, 0.0], [1.0, 0.0], [10.0, 0.0], [11.0, 0.0]]).unwrap();
        let samples = farthest_point_sample_cpu(&points, 2);
        assert_eq!(samples.as_slice(), &[0, 3]);

        let samples = farthest_point_sample_cpu(&points, 4);
        // After {0, 3}: point 1 is 1 from 0, point 2 is 1 from 3; tie -> lower index.
        assert_eq!(samples.as_slice(), &[0, 3, 1, 2]);
    }

    #[test]
    fn test_fps_zero_samples() {
        let points = PointSet::from_rows(&[[1.0, 2.0, 3.0]]).unwrap();
        assert!(farthest_point_sample_cpu(&points, 0).is_empty());
    }

    #[test]
    fn test_fps_more_samples_than_points() {
        let points = PointSet::from_rows(&[[0.0], [5.0], [2.0]]).unwrap();
        let samples = farthest_point_sample_cpu(&points, 10);
        assert_eq!(samples.as_slice(), &[0, 1, 2]);
    }

    #[test]
    fn test_fps_duplicate_points_stay_unique() {
        let points = PointSet::from_rows(&[[1.0, 1.0]; 5]).unwrap();
        let samples = farthest_point_sample_cpu(&points, 5);
        assert_eq!(samples.as_slice(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_fps_matches_brute_force() {
        let rows = make_random_sphere([0.0, 0.0, 0.0], 5.0, 300, 7);
        let points = PointSet::from_rows(&rows).unwrap();
        let samples = farthest_point_sample_cpu(&points, 40);
        assert_eq!(samples.as_slice(), brute_force_fps(&points, 40).as_slice());
    }

    #[test]
    fn test_fps_parallel_path_unique_and_deterministic() {
        // 31^3 = 29,791 points, above the parallel threshold
        let rows = make_cube_grid(30.0, 1.0, [0.0, 0.0, 0.0]);
        assert!(rows.len() >= PARALLEL_MIN_POINTS);
        let points = PointSet::from_rows(&rows).unwrap();

        let a = farthest_point_sample_cpu(&points, 64);
        let b = farthest_point_sample_cpu(&points, 64);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut sorted = a.clone().into_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 64);

        // Second sample of a cube from corner (0,0,0) is the opposite corner.
        assert_eq!(points.point(a.as_slice()[1] as usize), &[30.0, 30.0, 30.0]);
    }

    #[test]
    fn test_pick_farther_tie_break() {
        assert_eq!(pick_farther((2.0, 5), (2.0, 3)), (2.0, 3));
        assert_eq!(pick_farther((2.0, 3), (2.0, 5)), (2.0, 3));
        assert_eq!(pick_farther((1.0, 0), (2.0, 9)), (2.0, 9));
    }
}
