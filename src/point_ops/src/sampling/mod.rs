//! Farthest-point sampling.
//!
//! Greedy subset selection that maximizes the minimum distance between
//! selected points, used to downsample a cloud while keeping its spatial
//! coverage.
//!
//! - Seed: index 0.
//! - Each step picks the point farthest from the selected set; ties go to
//!   the lowest index.
//! - Output length is `min(num_samples, N)`; `num_samples == 0` gives an
//!   empty set.
//!
//! # Example
//!
//! ```ignore
//! use point_ops::{sampling::farthest_point_sample_cpu, PointSet};
//!
//! let points = PointSet::from_rows(&[[0.0, 0.0], [1.0, 0.0], [10.0, 0.0], [11.0, 0.0]])?;
//! let samples = farthest_point_sample_cpu(&points, 2);
//! assert_eq!(samples.as_slice(), &[0, 3]);
//! ```

mod cpu;
#[cfg(feature = "cuda")]
pub mod kernels;

pub use cpu::farthest_point_sample_cpu;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{make_random_sphere, transform_points};
    use crate::types::{squared_distance, PointSet};
    use nalgebra::{Isometry3, Vector3};

    /// Minimum pairwise squared distance among `indices`.
    fn min_pairwise(points: &PointSet, indices: &[u32]) -> f32 {
        let mut best = f32::INFINITY;
        for (a, &i) in indices.iter().enumerate() {
            for &j in &indices[a + 1..] {
                best = best.min(squared_distance(
                    points.point(i as usize),
                    points.point(j as usize),
                ));
            }
        }
        best
    }

    #[test]
    fn test_fps_length_and_uniqueness() {
        let rows = make_random_sphere([1.0, -2.0, 0.5], 3.0, 500, 11);
        let points = PointSet::from_rows(&rows).unwrap();

        for m in [1, 2, 17, 128, 500, 800] {
            let samples = farthest_point_sample_cpu(&points, m);
            assert_eq!(samples.len(), m.min(points.len()));

            let mut seen = samples.clone().into_vec();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), samples.len(), "duplicates for m = {m}");
        }
    }

    #[test]
    fn test_fps_each_step_is_greedy_optimal() {
        // Brute force check on a small cloud: every selected point was, at
        // its step, at least as far from the prefix as any unselected point.
        let rows = make_random_sphere([0.0, 0.0, 0.0], 1.0, 60, 3);
        let points = PointSet::from_rows(&rows).unwrap();
        let samples = farthest_point_sample_cpu(&points, 12).into_vec();

        let nearest = |i: usize, prefix: &[u32]| {
            prefix
                .iter()
                .map(|&s| squared_distance(points.point(i), points.point(s as usize)))
                .fold(f32::INFINITY, f32::min)
        };

        for t in 1..samples.len() {
            let prefix = &samples[..t];
            let chosen = nearest(samples[t] as usize, prefix);
            for i in 0..points.len() {
                if samples[..=t].contains(&(i as u32)) {
                    continue;
                }
                assert!(
                    nearest(i, prefix) <= chosen,
                    "step {t}: point {i} is farther than the selected point"
                );
            }
        }
    }

    #[test]
    fn test_fps_selection_distance_non_increasing() {
        // The distance of each new sample to the already selected prefix
        // (the greedy covering radius) shrinks as samples are added, and it
        // equals the minimum pairwise distance of the selected set.
        let rows = make_random_sphere([0.0, 0.0, 0.0], 2.0, 200, 5);
        let points = PointSet::from_rows(&rows).unwrap();
        let samples = farthest_point_sample_cpu(&points, 20).into_vec();

        let mut previous = f32::INFINITY;
        for t in 1..samples.len() {
            let radius = samples[..t]
                .iter()
                .map(|&s| squared_distance(points.point(samples[t] as usize), points.point(s as usize)))
                .fold(f32::INFINITY, f32::min);
            assert!(radius <= previous, "step {t}: {radius} > {previous}");
            assert_eq!(min_pairwise(&points, &samples[..=t]), radius);
            previous = radius;
        }
    }

    #[test]
    fn test_fps_invariant_under_rigid_motion() {
        let rows = make_random_sphere([0.0, 0.0, 0.0], 4.0, 150, 21);
        let points = PointSet::from_rows(&rows).unwrap();

        let pose = Isometry3::new(Vector3::new(3.0, -1.0, 7.0), Vector3::new(0.0, 0.0, 0.3));
        let moved = PointSet::from_rows(&transform_points(&rows, &pose)).unwrap();

        let a = farthest_point_sample_cpu(&points, 8);
        let b = farthest_point_sample_cpu(&moved, 8);
        assert_eq!(a, b);
    }
}
