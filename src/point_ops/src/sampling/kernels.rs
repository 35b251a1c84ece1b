//! GPU kernel for farthest-point sampling using CubeCL.
//!
//! The selection loop is sequential, so the whole sampling runs inside a
//! single cube: every unit strides over the points to update the distance
//! array, then a shared-memory tree reduction finds the argmax for the step.

use cubecl::prelude::*;

/// Units in the single sampling cube. Must be a power of two.
pub const FPS_CUBE_DIM: u32 = 256;

/// Greedy farthest-point sampling in one cube.
///
/// `dist` must be uploaded filled with +infinity. Selected points are
/// marked with -1 so they never win a later reduction. Ties resolve to the
/// lowest index, matching the CPU implementation.
#[cube(launch_unchecked)]
pub fn farthest_point_sample_kernel<F: Float>(
    points: &Array<F>,     // [N * dim] flattened coordinates
    dist: &mut Array<F>,   // [N] nearest-selected squared distance
    num_points: u32,       // N
    dim: u32,              // coordinate dimension
    num_samples: u32,      // M (<= N, >= 1)
    output: &mut Array<u32>, // [M] selected indices
) {
    let tid = UNIT_POS;

    let mut best_dist = SharedMemory::<F>::new(FPS_CUBE_DIM);
    let mut best_idx = SharedMemory::<u32>::new(FPS_CUBE_DIM);

    if tid == 0 {
        output[0] = 0u32;
        dist[0] = F::new(-1.0);
    }
    sync_cube();

    for s in 1..num_samples {
        let current = output[s - 1];
        let anchor = current * dim;

        let mut local_dist = F::new(-2.0);
        let mut local_idx = 0u32;

        let mut i = tid;
        while i < num_points {
            let base = i * dim;
            let mut d = F::new(0.0);
            for c in 0..dim {
                let diff = points[base + c] - points[anchor + c];
                d += diff * diff;
            }

            let mut nd = dist[i];
            if d < nd {
                nd = d;
            }
            dist[i] = nd;

            // Units walk their points in ascending order: strict > keeps the lowest index.
            if nd > local_dist {
                local_dist = nd;
                local_idx = i;
            }
            i += FPS_CUBE_DIM;
        }

        best_dist[tid] = local_dist;
        best_idx[tid] = local_idx;
        sync_cube();

        let mut stride = FPS_CUBE_DIM / 2;
        while stride > 0 {
            if tid < stride {
                let other = tid + stride;
                let od = best_dist[other];
                let oi = best_idx[other];
                let md = best_dist[tid];
                let mi = best_idx[tid];
                if od > md || (od == md && oi < mi) {
                    best_dist[tid] = od;
                    best_idx[tid] = oi;
                }
            }
            sync_cube();
            stride /= 2;
        }

        if tid == 0 {
            let chosen = best_idx[0];
            output[s] = chosen;
            dist[chosen] = F::new(-1.0);
        }
        sync_cube();
    }
}
