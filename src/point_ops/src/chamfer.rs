//! Chamfer distance between two point sets and its explicit gradient.
//!
//! ```text
//! L(X, Y) = mean_i min_j |x_i - y_j|^2 + mean_j min_i |y_j - x_i|^2
//! ```
//!
//! The backward pass treats the nearest-neighbor assignment as fixed and
//! routes the contributions that land on neighbor rows through
//! [`gather_backward_cpu`].

use rayon::prelude::*;

use crate::ball_query::PointSearch;
use crate::error::{PointOpsError, Result};
use crate::gather::gather_backward_cpu;
use crate::types::{squared_distance, Features, IndexSet, PointSet};

/// Target sets at least this large are searched through a KD-tree (3D only).
const KD_TREE_MIN_POINTS: usize = 64;

/// Forward result of [`chamfer_distance`], reused by [`chamfer_backward`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChamferResult {
    /// Symmetric chamfer distance.
    pub distance: f32,
    /// For each point of X, index of its nearest point in Y.
    pub nearest_in_y: IndexSet,
    /// For each point of X, squared distance to that neighbor.
    pub dist_x: Vec<f32>,
    /// For each point of Y, index of its nearest point in X.
    pub nearest_in_x: IndexSet,
    /// For each point of Y, squared distance to that neighbor.
    pub dist_y: Vec<f32>,
}

/// Compute the chamfer distance between `x` and `y`.
pub fn chamfer_distance(x: &PointSet, y: &PointSet) -> Result<ChamferResult> {
    x.ensure_same_dim(y, "second point set")?;

    let (nearest_in_y, dist_x) = nearest_neighbors(x, y);
    let (nearest_in_x, dist_y) = nearest_neighbors(y, x);

    let distance = (mean(&dist_x) + mean(&dist_y)) as f32;

    Ok(ChamferResult {
        distance,
        nearest_in_y: IndexSet::new(nearest_in_y),
        dist_x,
        nearest_in_x: IndexSet::new(nearest_in_x),
        dist_y,
    })
}

/// Gradients of `grad * L(X, Y)` with respect to `x` and `y`.
///
/// `result` must come from `chamfer_distance(x, y)` on the same sets.
pub fn chamfer_backward(
    x: &PointSet,
    y: &PointSet,
    result: &ChamferResult,
    grad: f32,
) -> Result<(Features, Features)> {
    x.ensure_same_dim(y, "second point set")?;
    if result.nearest_in_y.len() != x.len() || result.nearest_in_x.len() != y.len() {
        return Err(PointOpsError::invalid(
            "chamfer result does not belong to these point sets",
        ));
    }
    result.nearest_in_y.check_bounds(y.len())?;
    result.nearest_in_x.check_bounds(x.len())?;

    let scale_x = 2.0 * grad / x.len() as f32;
    let scale_y = 2.0 * grad / y.len() as f32;

    // Row i: d/dx_i of the X->Y term, i.e. scale_x * (x_i - y_nn(i)).
    let diff_xy = scaled_differences(x, y, &result.nearest_in_y, scale_x)?;
    // Row j: d/dy_j of the Y->X term.
    let diff_yx = scaled_differences(y, x, &result.nearest_in_x, scale_y)?;

    // The same pair terms pull the neighbor rows the opposite way.
    let pulled_x = gather_backward_cpu(&diff_yx, &result.nearest_in_x, x.len())?;
    let pulled_y = gather_backward_cpu(&diff_xy, &result.nearest_in_y, y.len())?;

    Ok((subtract(diff_xy, &pulled_x)?, subtract(diff_yx, &pulled_y)?))
}

/// Nearest target for every query point: `(indices, squared distances)`.
fn nearest_neighbors(queries: &PointSet, targets: &PointSet) -> (Vec<u32>, Vec<f32>) {
    let search = if targets.len() >= KD_TREE_MIN_POINTS {
        PointSearch::from_points(targets)
    } else {
        None
    };

    let pairs: Vec<(u32, f32)> = match search {
        Some(search) => queries
            .as_flat()
            .par_chunks(3)
            .map(|q| {
                let (idx, _) = search.nearest(&[q[0], q[1], q[2]]);
                (idx as u32, squared_distance(q, targets.point(idx)))
            })
            .collect(),
        None => queries
            .as_flat()
            .par_chunks(queries.dim())
            .map(|q| brute_force_nearest(q, targets))
            .collect(),
    };

    pairs.into_iter().unzip()
}

/// Linear scan, lowest index on ties.
fn brute_force_nearest(query: &[f32], targets: &PointSet) -> (u32, f32) {
    let mut best = (0u32, f32::INFINITY);
    for (i, p) in targets.iter().enumerate() {
        let d = squared_distance(query, p);
        if d < best.1 {
            best = (i as u32, d);
        }
    }
    best
}

fn scaled_differences(
    from: &PointSet,
    to: &PointSet,
    nearest: &IndexSet,
    scale: f32,
) -> Result<Features> {
    let dim = from.dim();
    let mut data = vec![0.0f32; from.len() * dim];
    data.par_chunks_mut(dim)
        .zip(from.as_flat().par_chunks(dim))
        .zip(nearest.as_slice().par_iter())
        .for_each(|((row, p), &j)| {
            for ((out, a), b) in row.iter_mut().zip(p).zip(to.point(j as usize)) {
                *out = scale * (a - b);
            }
        });
    Features::new(data, from.len(), dim)
}

fn subtract(lhs: Features, rhs: &Features) -> Result<Features> {
    let [rows, cols] = lhs.shape();
    let mut data = lhs.into_vec();
    for (a, b) in data.iter_mut().zip(rhs.as_slice()) {
        *a -= b;
    }
    Features::new(data, rows, cols)
}

fn mean(values: &[f32]) -> f64 {
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}
