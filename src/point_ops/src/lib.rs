//! Point-cloud operators for PointNet++-style networks.
//!
//! This library provides the sampling and grouping primitives used by
//! hierarchical point-cloud models, with rayon CPU implementations and
//! optional CubeCL CUDA kernels (`cuda` feature).
//!
//! # Operations
//!
//! - Farthest-point sampling: pick M well-spread representatives
//! - Ball query: up to K neighbors within a radius, padded per query
//! - Gather: select feature rows by index
//! - Gather backward: scatter-add gradients to the source rows
//! - Chamfer distance: symmetric nearest-neighbor loss and its gradient
//!
//! # Usage
//!
//! ```ignore
//! use point_ops::{PointOps, PointSet};
//!
//! let ops = PointOps::builder().use_gpu(true).build()?;
//!
//! let points = PointSet::from_rows(&cloud)?;
//! let centroids = ops.farthest_point_sample(&points, 512)?;
//! let centers = ops.gather_points(&points, &centroids)?;
//!
//! let groups = ops.ball_query(&points, &centers, 0.2, 32)?;
//! let grouped = ops.gather(&features, &groups.to_index_set())?;
//!
//! // Route upstream gradients back to the original rows.
//! let grad_features = ops.gather_backward(&grad_grouped, &groups.to_index_set(), points.len())?;
//! ```

pub mod ball_query;
pub mod chamfer;
pub mod error;
pub mod gather;
pub mod ops;
#[cfg(feature = "cuda")]
pub mod runtime;
pub mod sampling;
pub mod test_utils;
pub mod timing;
pub mod types;

pub use ball_query::{ball_query_cpu, ball_query_kdtree, PointSearch};
pub use chamfer::{chamfer_backward, chamfer_distance, ChamferResult};
pub use error::PointOpsError;
pub use gather::{gather_backward_cpu, gather_cpu, gather_points_cpu, ScatterPlan};
pub use sampling::farthest_point_sample_cpu;
pub use timing::{Backend, OpKind, OpTiming, TimingSummary};
pub use types::{Features, IndexSet, NeighborTable, PointSet};

// High-level API (recommended for most users)
pub use ops::{PointOps, PointOpsBuilder, PointOpsConfig};

// GPU runtime (optional, for direct GPU access)
#[cfg(feature = "cuda")]
pub use runtime::{is_cuda_available, GpuRuntime};
