//! GPU kernel for ball query using CubeCL.

use cubecl::prelude::*;

/// Brute-force ball query, one unit per query point.
///
/// Scans the points in storage order and keeps the first `k` within the
/// radius, then pads the row with the first match (or 0 when there is none).
/// O(Q * N) with good parallelism for point clouds up to ~1e5 points.
#[cube(launch_unchecked)]
pub fn ball_query_kernel<F: Float>(
    points: &Array<F>,        // [N * dim]
    queries: &Array<F>,       // [Q * dim]
    radius_sq: F,             // search radius squared
    num_points: u32,          // N
    num_queries: u32,         // Q
    dim: u32,                 // coordinate dimension
    k: u32,                   // slots per query
    indices: &mut Array<u32>, // output [Q * k]
    counts: &mut Array<u32>,  // output [Q]
) {
    let query_idx = ABSOLUTE_POS;

    if query_idx >= num_queries {
        terminate!();
    }

    let q_base = query_idx * dim;
    let out_base = query_idx * k;

    let mut count = 0u32;

    // No `break` once the row is full: CubeCL uniformity analysis rejects it
    // here, so the remaining points are skipped with a flag instead.
    for i in 0..num_points {
        if count < k {
            let p_base = i * dim;
            let mut dist_sq = F::new(0.0);
            for c in 0..dim {
                let diff = queries[q_base + c] - points[p_base + c];
                dist_sq += diff * diff;
            }

            if dist_sq <= radius_sq {
                indices[out_base + count] = i;
                count += 1u32;
            }
        }
    }

    let mut fill = 0u32;
    if count > 0u32 {
        fill = indices[out_base];
    }
    for slot in count..k {
        indices[out_base + slot] = fill;
    }

    counts[query_idx] = count;
}
