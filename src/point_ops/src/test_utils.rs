//! Deterministic synthetic point clouds for tests and benchmarks.

use nalgebra::{Isometry3, Point3};

/// Uniform random points inside a ball, reproducible from `seed`.
///
/// Uses a small LCG so results are identical across platforms and rand
/// versions.
pub fn make_random_sphere(
    center: [f32; 3],
    radius: f32,
    num_points: usize,
    seed: u64,
) -> Vec<[f32; 3]> {
    let mut state = seed;
    let mut next_unit = || -> f32 {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 40) as f32) / ((1u64 << 24) as f32)
    };

    let mut points = Vec::with_capacity(num_points);
    while points.len() < num_points {
        // Rejection sampling from the enclosing cube.
        let u = next_unit() * 2.0 - 1.0;
        let v = next_unit() * 2.0 - 1.0;
        let w = next_unit() * 2.0 - 1.0;
        if u * u + v * v + w * w <= 1.0 {
            points.push([
                center[0] + u * radius,
                center[1] + v * radius,
                center[2] + w * radius,
            ]);
        }
    }
    points
}

/// Regular 3D grid of `(size / interval + 1)^3` points starting at `offset`.
///
/// Ordered x fastest, then y, then z.
pub fn make_cube_grid(size: f32, interval: f32, offset: [f32; 3]) -> Vec<[f32; 3]> {
    let per_axis = ((size / interval) as usize) + 1;
    let mut points = Vec::with_capacity(per_axis.pow(3));

    for iz in 0..per_axis {
        for iy in 0..per_axis {
            for ix in 0..per_axis {
                points.push([
                    offset[0] + interval * ix as f32,
                    offset[1] + interval * iy as f32,
                    offset[2] + interval * iz as f32,
                ]);
            }
        }
    }
    points
}

/// Square grid in the plane `z = z`.
pub fn make_xy_plane(size: f32, interval: f32, z: f32) -> Vec<[f32; 3]> {
    let per_axis = ((size / interval) as usize) + 1;
    (0..per_axis * per_axis)
        .map(|i| {
            let x = interval * (i % per_axis) as f32;
            let y = interval * (i / per_axis) as f32;
            [x, y, z]
        })
        .collect()
}

/// Apply a rigid transform to every point.
pub fn transform_points(points: &[[f32; 3]], pose: &Isometry3<f32>) -> Vec<[f32; 3]> {
    points
        .iter()
        .map(|p| {
            let q = pose * Point3::new(p[0], p[1], p[2]);
            [q.x, q.y, q.z]
        })
        .collect()
}

/// Axis-aligned bounds `(min, max)` of a point cloud.
pub fn compute_bounds(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];

    for p in points {
        for i in 0..3 {
            min[i] = min[i].min(p[i]);
            max[i] = max[i].max(p[i]);
        }
    }

    (min, max)
}
