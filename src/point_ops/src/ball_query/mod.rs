//! Fixed-radius neighbor search (ball query).
//!
//! For each query point, returns up to `k` indices of stored points whose
//! squared distance to the query is `<= radius^2`. Matches are kept in
//! storage order (the first `k` found, not the `k` nearest).
//!
//! Output is a fixed-width [`NeighborTable`](crate::NeighborTable):
//! - fewer than `k` matches: remaining slots repeat the first match;
//! - no match: every slot is index 0 and the row count is 0;
//! - a query coinciding with a stored point matches it (self-inclusion).
//!
//! Three interchangeable strategies produce identical tables:
//! - [`ball_query_cpu`]: brute-force scan, rayon over queries;
//! - [`ball_query_kdtree`]: kiddo KD-tree, 3D only;
//! - `kernels::ball_query_kernel`: CubeCL GPU kernel (`cuda` feature).

mod cpu;
#[cfg(feature = "cuda")]
pub mod kernels;
mod search;

pub use cpu::ball_query_cpu;
pub use search::{ball_query_kdtree, PointSearch};

use crate::error::{PointOpsError, Result};
use crate::types::PointSet;

/// Argument checks shared by every ball-query strategy.
pub(crate) fn validate_ball_query(
    points: &PointSet,
    queries: &PointSet,
    radius: f32,
    k: usize,
) -> Result<()> {
    if k == 0 {
        return Err(PointOpsError::invalid("k must be at least 1"));
    }
    if !radius.is_finite() || radius < 0.0 {
        return Err(PointOpsError::invalid(format!(
            "radius must be finite and non-negative, got {radius}"
        )));
    }
    let table_len = queries
        .len()
        .checked_mul(k)
        .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<u32>());
    if table_len.is_none() {
        return Err(PointOpsError::invalid(format!(
            "{} queries with k = {k} overflow the neighbor table",
            queries.len()
        )));
    }
    points.ensure_same_dim(queries, "query")
}
