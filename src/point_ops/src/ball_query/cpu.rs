//! Brute-force ball query on the CPU, parallel over queries.

use rayon::prelude::*;

use super::validate_ball_query;
use crate::error::Result;
use crate::types::{squared_distance, NeighborTable, PointSet};

/// For each query, collect the first `k` points within `radius` in storage order.
///
/// O(|queries| * N). Rows with fewer than `k` matches repeat the first match;
/// rows with no match are all zeros with a count of 0.
pub fn ball_query_cpu(
    points: &PointSet,
    queries: &PointSet,
    radius: f32,
    k: usize,
) -> Result<NeighborTable> {
    validate_ball_query(points, queries, radius, k)?;

    let radius_sq = radius * radius;
    let num_queries = queries.len();

    let mut indices = vec![0u32; num_queries * k];
    let mut counts = vec![0u32; num_queries];

    indices
        .par_chunks_mut(k)
        .zip(counts.par_iter_mut())
        .zip(queries.as_flat().par_chunks(queries.dim()))
        .for_each(|((row, count), query)| {
            let mut found = 0usize;
            for (i, p) in points.iter().enumerate() {
                if found == k {
                    break;
                }
                if squared_distance(query, p) <= radius_sq {
                    row[found] = i as u32;
                    found += 1;
                }
            }
            pad_row(row, found);
            *count = found as u32;
        });

    Ok(NeighborTable::from_parts(indices, counts, k))
}

/// Fill slots `found..` with the first match, or the whole row with 0 when
/// nothing matched.
pub(crate) fn pad_row(row: &mut [u32], found: usize) {
    if found == 0 {
        row.fill(0);
    } else {
        let first = row[0];
        row[found..].fill(first);
    }
}
