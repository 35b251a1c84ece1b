//! CPU implementations of gather and its adjoint.

use rayon::prelude::*;

use super::{validate_gather_backward, ScatterPlan};
use crate::error::{PointOpsError, Result};
use crate::types::{Features, IndexSet, PointSet};

/// `output[m] = buffer[indices[m]]` for every row.
///
/// Fails with `IndexOutOfRange` before copying anything.
pub fn gather_cpu(buffer: &Features, indices: &IndexSet) -> Result<Features> {
    indices.check_bounds(buffer.rows())?;

    let cols = buffer.cols();
    let mut output = vec![0.0f32; indices.len() * cols];

    output
        .par_chunks_mut(cols)
        .zip(indices.as_slice().par_iter())
        .for_each(|(row, &i)| row.copy_from_slice(buffer.row(i as usize)));

    Features::new(output, indices.len(), cols)
}

/// Gather coordinates into a new, smaller point set.
///
/// Composes with sampler and ball-query output. An empty index set is
/// rejected because a point set cannot be empty.
pub fn gather_points_cpu(points: &PointSet, indices: &IndexSet) -> Result<PointSet> {
    if indices.is_empty() {
        return Err(PointOpsError::EmptyInput("no indices to gather points with"));
    }
    indices.check_bounds(points.len())?;

    let dim = points.dim();
    let mut output = vec![0.0f32; indices.len() * dim];
    output
        .par_chunks_mut(dim)
        .zip(indices.as_slice().par_iter())
        .for_each(|(row, &i)| row.copy_from_slice(points.point(i as usize)));

    PointSet::from_flat(output, dim)
}

/// Adjoint of [`gather_cpu`]: `result[indices[m]] += grad_output[m]`.
///
/// Rows are grouped by destination first, so each output row is owned by
/// exactly one rayon task and sums its contributors in ascending `m`.
pub fn gather_backward_cpu(
    grad_output: &Features,
    indices: &IndexSet,
    num_rows: usize,
) -> Result<Features> {
    validate_gather_backward(grad_output, indices, num_rows)?;
    let plan = ScatterPlan::new(indices, num_rows)?;

    let cols = grad_output.cols();
    let mut result = vec![0.0f32; num_rows * cols];

    result
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(dest, row)| {
            for &m in plan.sources(dest) {
                for (acc, g) in row.iter_mut().zip(grad_output.row(m as usize)) {
                    *acc += g;
                }
            }
        });

    Features::new(result, num_rows, cols)
}
