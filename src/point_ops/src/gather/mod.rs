//! Index-based row selection and its adjoint.
//!
//! - [`gather_cpu`]: `output[m] = buffer[indices[m]]`, shape `[M, F]`.
//! - [`gather_backward_cpu`]: zero-initialized `[N, F]` buffer with
//!   `result[indices[m]] += grad_output[m]`.
//!
//! The pair satisfies the dot-product adjoint identity
//! `<gather(X, I), G> == <X, gather_backward(G, I, N)>`, which is how
//! gradients are routed back through an indexing step without an autograd
//! engine.
//!
//! # Accumulation
//!
//! Several output rows may reference the same source row. Instead of
//! atomic adds, the backward pass builds a [`ScatterPlan`] (a counting sort
//! of `m` by destination) and lets each destination row own its sum. The
//! CPU and GPU paths share the plan and add contributors in the same order.

mod cpu;
#[cfg(feature = "cuda")]
pub mod kernels;

pub use cpu::{gather_backward_cpu, gather_cpu, gather_points_cpu};

use crate::error::{PointOpsError, Result};
use crate::types::{Features, IndexSet};

/// Source rows grouped by destination row.
///
/// `order[offsets[n]..offsets[n + 1]]` lists, in ascending order, every `m`
/// with `indices[m] == n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScatterPlan {
    offsets: Vec<u32>,
    order: Vec<u32>,
}

impl ScatterPlan {
    /// Stable counting sort of `0..indices.len()` by destination.
    pub fn new(indices: &IndexSet, num_rows: usize) -> Result<Self> {
        indices.check_bounds(num_rows)?;
        if indices.len() > u32::MAX as usize {
            return Err(PointOpsError::invalid(format!(
                "{} indices exceed the u32 scatter range",
                indices.len()
            )));
        }

        let mut offsets = vec![0u32; num_rows + 1];
        for &i in indices.as_slice() {
            offsets[i as usize + 1] += 1;
        }
        for n in 0..num_rows {
            offsets[n + 1] += offsets[n];
        }

        let mut cursor = offsets.clone();
        let mut order = vec![0u32; indices.len()];
        for (m, &i) in indices.as_slice().iter().enumerate() {
            let slot = &mut cursor[i as usize];
            order[*slot as usize] = m as u32;
            *slot += 1;
        }

        Ok(Self { offsets, order })
    }

    /// Source rows contributing to destination row `dest`.
    pub fn sources(&self, dest: usize) -> &[u32] {
        &self.order[self.offsets[dest] as usize..self.offsets[dest + 1] as usize]
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn order(&self) -> &[u32] {
        &self.order
    }
}

/// Argument checks shared by every gather-backward strategy.
pub(crate) fn validate_gather_backward(
    grad_output: &Features,
    indices: &IndexSet,
    num_rows: usize,
) -> Result<()> {
    if num_rows == 0 {
        return Err(PointOpsError::EmptyInput("gather-backward target has no rows"));
    }
    let result_len = num_rows
        .checked_mul(grad_output.cols())
        .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<f32>());
    if result_len.is_none() {
        return Err(PointOpsError::invalid(format!(
            "{num_rows} rows of width {} are too large to allocate",
            grad_output.cols()
        )));
    }
    if indices.len() != grad_output.rows() {
        return Err(PointOpsError::invalid(format!(
            "{} indices for {} gradient rows",
            indices.len(),
            grad_output.rows()
        )));
    }
    indices.check_bounds(num_rows)
}
