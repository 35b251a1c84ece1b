//! Buffer types shared by the point operations.
//!
//! Everything is stored row-major in flat `Vec`s so that the same memory
//! can be handed to rayon chunks on the CPU or uploaded as-is to the GPU.

use nalgebra::Point3;

use crate::error::{PointOpsError, Result};

/// Squared Euclidean distance between two equally sized coordinate rows.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// An immutable set of N points in D-dimensional space.
///
/// Invariants: N >= 1, D >= 1, coordinates stored as `[x0, y0, .., x1, y1, ..]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    data: Vec<f32>,
    dim: usize,
}

impl PointSet {
    /// Build a point set from flattened coordinates.
    pub fn from_flat(data: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(PointOpsError::invalid("point dimension must be at least 1"));
        }
        if data.is_empty() {
            return Err(PointOpsError::EmptyInput("point set has no points"));
        }
        if data.len() % dim != 0 {
            return Err(PointOpsError::invalid(format!(
                "{} coordinates cannot be split into rows of dimension {dim}",
                data.len()
            )));
        }
        Ok(Self { data, dim })
    }

    /// Build a point set from fixed-size rows.
    ///
    /// ```ignore
    /// let points = PointSet::from_rows(&[[0.0, 0.0], [1.0, 0.0]])?;
    /// assert_eq!(points.dim(), 2);
    /// ```
    pub fn from_rows<const D: usize>(rows: &[[f32; D]]) -> Result<Self> {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::from_flat(data, D)
    }

    /// Build a 3D point set from nalgebra points.
    pub fn from_points3(points: &[Point3<f32>]) -> Result<Self> {
        let data = points.iter().flat_map(|p| [p.x, p.y, p.z]).collect();
        Self::from_flat(data, 3)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// Always false for a constructed set; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Coordinate dimension D.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Coordinates of point `i`.
    pub fn point(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Point `i` as a nalgebra point, if the set is three-dimensional.
    pub fn point3(&self, i: usize) -> Option<Point3<f32>> {
        if self.dim != 3 {
            return None;
        }
        let p = self.point(i);
        Some(Point3::new(p[0], p[1], p[2]))
    }

    /// Iterate over coordinate rows.
    pub fn iter(&self) -> std::slice::ChunksExact<'_, f32> {
        self.data.chunks_exact(self.dim)
    }

    /// Flattened coordinates.
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Copy out `[x, y, z]` rows for a three-dimensional set.
    pub fn to_rows3(&self) -> Option<Vec<[f32; 3]>> {
        if self.dim != 3 {
            return None;
        }
        Some(self.iter().map(|p| [p[0], p[1], p[2]]).collect())
    }

    /// Reinterpret the coordinates as an `[N, D]` feature buffer.
    pub fn into_features(self) -> Features {
        let rows = self.len();
        Features {
            data: self.data,
            rows,
            cols: self.dim,
        }
    }

    pub(crate) fn ensure_same_dim(&self, other: &PointSet, what: &str) -> Result<()> {
        if self.dim != other.dim {
            return Err(PointOpsError::invalid(format!(
                "{what} dimension {} does not match point dimension {}",
                other.dim, self.dim
            )));
        }
        Ok(())
    }
}

/// Row-major `[rows, cols]` buffer of `f32` values.
///
/// This is the tensor-like buffer that gather reads from and gather-backward
/// writes into. Zero rows are allowed, zero columns are not.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Features {
    /// Wrap an existing buffer.
    pub fn new(data: Vec<f32>, rows: usize, cols: usize) -> Result<Self> {
        if cols == 0 {
            return Err(PointOpsError::invalid("feature width must be at least 1"));
        }
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(PointOpsError::invalid(format!(
                "buffer of {} values does not match shape [{rows}, {cols}]",
                data.len()
            )));
        }
        Ok(Self { data, rows, cols })
    }

    /// Zero-filled buffer.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .filter(|&n| n <= isize::MAX as usize / std::mem::size_of::<f32>())
            .ok_or_else(|| {
                PointOpsError::invalid(format!("shape [{rows}, {cols}] is too large to allocate"))
            })?;
        Self::new(vec![0.0; len], rows, cols)
    }

    /// Build from fixed-size rows.
    pub fn from_rows<const F: usize>(rows: &[[f32; F]]) -> Result<Self> {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(data, rows.len(), F)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Shape as `[rows, cols]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Sum of the element-wise product, accumulated in f64.
    ///
    /// Used for adjoint (dot-product) checks between a forward and a
    /// backward operation.
    pub fn dot(&self, other: &Features) -> Result<f64> {
        if self.shape() != other.shape() {
            return Err(PointOpsError::invalid(format!(
                "shape {:?} does not match {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| *a as f64 * *b as f64)
            .sum())
    }
}

/// Ordered indices into a point set or feature buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSet {
    indices: Vec<u32>,
}

impl IndexSet {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    /// Convert signed indices addressing `len` rows.
    ///
    /// Negative values and values `>= len` fail with `IndexOutOfRange`.
    pub fn from_signed(indices: &[i64], len: usize) -> Result<Self> {
        let indices = indices
            .iter()
            .map(|&i| match u32::try_from(i) {
                Ok(index) if (index as usize) < len => Ok(index),
                _ => Err(PointOpsError::IndexOutOfRange { index: i, len }),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { indices })
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().map(|&i| i as usize)
    }

    pub fn into_vec(self) -> Vec<u32> {
        self.indices
    }

    /// Fail with `IndexOutOfRange` on the first index `>= len`.
    pub fn check_bounds(&self, len: usize) -> Result<()> {
        match self.indices.iter().find(|&&i| i as usize >= len) {
            Some(&index) => Err(PointOpsError::IndexOutOfRange {
                index: index as i64,
                len,
            }),
            None => Ok(()),
        }
    }
}

impl From<Vec<u32>> for IndexSet {
    fn from(indices: Vec<u32>) -> Self {
        Self::new(indices)
    }
}

/// Fixed-width ball-query output.
///
/// Each query owns `k` slots. The first `counts[q]` slots hold genuine
/// matches in storage order; the remaining slots repeat the first match.
/// A query with no match has `counts[q] == 0` and every slot set to index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTable {
    indices: Vec<u32>,
    counts: Vec<u32>,
    k: usize,
}

impl NeighborTable {
    pub(crate) fn from_parts(indices: Vec<u32>, counts: Vec<u32>, k: usize) -> Self {
        debug_assert_eq!(indices.len(), counts.len() * k);
        Self { indices, counts, k }
    }

    /// Number of query rows.
    pub fn num_queries(&self) -> usize {
        self.counts.len()
    }

    /// Slots per row.
    pub fn k(&self) -> usize {
        self.k
    }

    /// All `k` slots of query `q`, padding included.
    pub fn row(&self, q: usize) -> &[u32] {
        &self.indices[q * self.k..(q + 1) * self.k]
    }

    /// Number of genuine matches for query `q`.
    pub fn count(&self, q: usize) -> usize {
        self.counts[q] as usize
    }

    /// Genuine matches of query `q`, without padding.
    pub fn matches(&self, q: usize) -> &[u32] {
        &self.row(q)[..self.count(q)]
    }

    /// True when query `q` found nothing within the radius.
    pub fn is_unmatched(&self, q: usize) -> bool {
        self.counts[q] == 0
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn as_flat(&self) -> &[u32] {
        &self.indices
    }

    /// Flatten to a `num_queries * k` index set, ready for gather.
    pub fn to_index_set(&self) -> IndexSet {
        IndexSet::new(self.indices.clone())
    }
}
