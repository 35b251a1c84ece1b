//! High-level dispatcher over the point operations.
//!
//! [`PointOps`] validates inputs once, picks an execution path per call
//! and records timing:
//! - GPU (CubeCL, `cuda` feature) when enabled, available, and the input is
//!   at least `gpu_min_points` large;
//! - KD-tree ball query for 3D sets of at least `kd_tree_min_points`;
//! - rayon CPU kernels otherwise.
//!
//! A GPU failure is logged and the call is answered on the CPU instead.
//!
//! # Example
//!
//! ```ignore
//! use point_ops::{PointOps, PointSet};
//!
//! let ops = PointOps::builder().use_gpu(true).build()?;
//! let centroids = ops.farthest_point_sample(&points, 512)?;
//! let groups = ops.ball_query(&points, &ops.gather_points(&points, &centroids)?, 0.2, 32)?;
//! let grouped = ops.gather(&features, &groups.to_index_set())?;
//! ```

use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ball_query::{ball_query_cpu, ball_query_kdtree, validate_ball_query, PointSearch};
use crate::chamfer::{chamfer_backward, chamfer_distance, ChamferResult};
use crate::gather::{gather_backward_cpu, gather_cpu, gather_points_cpu, validate_gather_backward};
#[cfg(feature = "cuda")]
use crate::runtime::GpuRuntime;
use crate::sampling::farthest_point_sample_cpu;
use crate::timing::{Backend, OpKind, Timer, TimingCollector, TimingSummary};
use crate::types::{Features, IndexSet, NeighborTable, PointSet};

/// Configuration for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointOpsConfig {
    /// Whether to use GPU acceleration (requires the `cuda` feature and a device).
    /// Falls back to CPU if the GPU is not available.
    pub use_gpu: bool,

    /// CUDA device ordinal.
    pub device_id: usize,

    /// Inputs with fewer points stay on the CPU; kernel launch and transfer
    /// overhead dominates below this size.
    pub gpu_min_points: usize,

    /// Minimum stored points before a 3D ball query builds a KD-tree.
    pub kd_tree_min_points: usize,
}

impl Default for PointOpsConfig {
    fn default() -> Self {
        Self {
            use_gpu: false,
            device_id: 0,
            gpu_min_points: 10_000,
            kd_tree_min_points: 4096,
        }
    }
}

impl PointOpsConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid point_ops configuration")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize configuration")
    }
}

/// Builder for [`PointOps`].
#[derive(Debug, Clone, Default)]
pub struct PointOpsBuilder {
    config: PointOpsConfig,
}

impl PointOpsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable GPU acceleration.
    pub fn use_gpu(mut self, use_gpu: bool) -> Self {
        self.config.use_gpu = use_gpu;
        self
    }

    /// Select the CUDA device.
    pub fn device_id(mut self, device_id: usize) -> Self {
        self.config.device_id = device_id;
        self
    }

    /// Set the minimum input size routed to the GPU.
    pub fn gpu_min_points(mut self, min_points: usize) -> Self {
        self.config.gpu_min_points = min_points;
        self
    }

    /// Set the minimum stored-point count for KD-tree ball queries.
    pub fn kd_tree_min_points(mut self, min_points: usize) -> Self {
        self.config.kd_tree_min_points = min_points;
        self
    }

    pub fn build(self) -> Result<PointOps> {
        PointOps::with_config(self.config)
    }
}

/// Point operations with automatic CPU/GPU dispatch.
pub struct PointOps {
    config: PointOpsConfig,

    /// GPU runtime (None if GPU not available/enabled).
    #[cfg(feature = "cuda")]
    gpu_runtime: Option<GpuRuntime>,

    timing: Mutex<TimingCollector>,
}

impl PointOps {
    /// CPU-only dispatcher with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(PointOpsConfig::default())
    }

    pub fn with_config(config: PointOpsConfig) -> Result<Self> {
        #[cfg(feature = "cuda")]
        let gpu_runtime = if config.use_gpu {
            match GpuRuntime::with_device_id(config.device_id) {
                Ok(runtime) => {
                    debug!(device_id = config.device_id, "GPU runtime initialized");
                    Some(runtime)
                }
                Err(e) => {
                    warn!("Failed to initialize GPU runtime: {e}. Falling back to CPU.");
                    None
                }
            }
        } else {
            None
        };

        #[cfg(not(feature = "cuda"))]
        if config.use_gpu {
            warn!("GPU requested but point_ops was built without the `cuda` feature, using CPU");
        }

        Ok(Self {
            config,
            #[cfg(feature = "cuda")]
            gpu_runtime,
            timing: Mutex::new(TimingCollector::new()),
        })
    }

    pub fn builder() -> PointOpsBuilder {
        PointOpsBuilder::new()
    }

    pub fn config(&self) -> &PointOpsConfig {
        &self.config
    }

    /// True when calls above `gpu_min_points` will run on the GPU.
    pub fn has_gpu(&self) -> bool {
        #[cfg(feature = "cuda")]
        {
            self.gpu_runtime.is_some()
        }
        #[cfg(not(feature = "cuda"))]
        {
            false
        }
    }

    /// Farthest-point sampling; see [`crate::sampling`].
    pub fn farthest_point_sample(&self, points: &PointSet, num_samples: usize) -> Result<IndexSet> {
        let timer = Timer::start();

        #[cfg(feature = "cuda")]
        if let Some(samples) = self.try_gpu(OpKind::FarthestPointSample, points.len(), |gpu| {
            gpu.farthest_point_sample(points, num_samples)
        }) {
            self.record(OpKind::FarthestPointSample, Backend::Gpu, &timer);
            return Ok(samples);
        }

        debug!(points = points.len(), num_samples, "farthest point sampling on CPU");
        let samples = farthest_point_sample_cpu(points, num_samples);
        self.record(OpKind::FarthestPointSample, Backend::Cpu, &timer);
        Ok(samples)
    }

    /// Ball query; see [`crate::ball_query`].
    pub fn ball_query(
        &self,
        points: &PointSet,
        queries: &PointSet,
        radius: f32,
        k: usize,
    ) -> Result<NeighborTable> {
        validate_ball_query(points, queries, radius, k)?;
        let timer = Timer::start();

        #[cfg(feature = "cuda")]
        if let Some(table) = self.try_gpu(OpKind::BallQuery, points.len(), |gpu| {
            gpu.ball_query(points, queries, radius, k)
        }) {
            self.record(OpKind::BallQuery, Backend::Gpu, &timer);
            return Ok(table);
        }

        if points.len() >= self.config.kd_tree_min_points {
            if let Some(search) = PointSearch::from_points(points) {
                debug!(
                    points = points.len(),
                    queries = queries.len(),
                    radius,
                    k,
                    "ball query through KD-tree"
                );
                let table = ball_query_kdtree(&search, points, queries, radius, k)?;
                self.record(OpKind::BallQuery, Backend::KdTree, &timer);
                return Ok(table);
            }
        }

        debug!(
            points = points.len(),
            queries = queries.len(),
            radius,
            k,
            "brute-force ball query on CPU"
        );
        let table = ball_query_cpu(points, queries, radius, k)?;
        self.record(OpKind::BallQuery, Backend::Cpu, &timer);
        Ok(table)
    }

    /// Row gather; see [`crate::gather`].
    pub fn gather(&self, buffer: &Features, indices: &IndexSet) -> Result<Features> {
        indices.check_bounds(buffer.rows())?;
        let timer = Timer::start();

        #[cfg(feature = "cuda")]
        if let Some(output) = self.try_gpu(OpKind::Gather, indices.len(), |gpu| {
            gpu.gather(buffer, indices)
        }) {
            self.record(OpKind::Gather, Backend::Gpu, &timer);
            return Ok(output);
        }

        let output = gather_cpu(buffer, indices)?;
        self.record(OpKind::Gather, Backend::Cpu, &timer);
        Ok(output)
    }

    /// Gather coordinates into a derived point set.
    pub fn gather_points(&self, points: &PointSet, indices: &IndexSet) -> Result<PointSet> {
        let timer = Timer::start();
        let subset = gather_points_cpu(points, indices)?;
        self.record(OpKind::Gather, Backend::Cpu, &timer);
        Ok(subset)
    }

    /// Gather adjoint; see [`crate::gather`].
    pub fn gather_backward(
        &self,
        grad_output: &Features,
        indices: &IndexSet,
        num_rows: usize,
    ) -> Result<Features> {
        validate_gather_backward(grad_output, indices, num_rows)?;
        let timer = Timer::start();

        #[cfg(feature = "cuda")]
        if let Some(result) = self.try_gpu(OpKind::GatherBackward, indices.len(), |gpu| {
            gpu.gather_backward(grad_output, indices, num_rows)
        }) {
            self.record(OpKind::GatherBackward, Backend::Gpu, &timer);
            return Ok(result);
        }

        let result = gather_backward_cpu(grad_output, indices, num_rows)?;
        self.record(OpKind::GatherBackward, Backend::Cpu, &timer);
        Ok(result)
    }

    /// Chamfer distance; see [`crate::chamfer`].
    pub fn chamfer_distance(&self, x: &PointSet, y: &PointSet) -> Result<ChamferResult> {
        let timer = Timer::start();
        let result = chamfer_distance(x, y)?;
        self.record(OpKind::Chamfer, Backend::Cpu, &timer);
        Ok(result)
    }

    /// Chamfer gradient; see [`crate::chamfer`].
    pub fn chamfer_backward(
        &self,
        x: &PointSet,
        y: &PointSet,
        result: &ChamferResult,
        grad: f32,
    ) -> Result<(Features, Features)> {
        let timer = Timer::start();
        let grads = chamfer_backward(x, y, result, grad)?;
        self.record(OpKind::ChamferBackward, Backend::Cpu, &timer);
        Ok(grads)
    }

    /// Timing collected so far (empty without the `profiling` feature).
    pub fn timing_summary(&self) -> TimingSummary {
        self.timing
            .lock()
            .map(|collector| collector.summary())
            .unwrap_or_default()
    }

    pub fn reset_timing(&self) {
        if let Ok(mut collector) = self.timing.lock() {
            collector.reset();
        }
    }

    fn record(&self, op: OpKind, backend: Backend, timer: &Timer) {
        if let Ok(mut collector) = self.timing.lock() {
            collector.record(op, backend, timer.elapsed_ms());
        }
    }

    /// Run `f` on the GPU when it is worth it; `None` means "use the CPU".
    #[cfg(feature = "cuda")]
    fn try_gpu<T>(
        &self,
        op: OpKind,
        size: usize,
        f: impl FnOnce(&GpuRuntime) -> Result<T>,
    ) -> Option<T> {
        let runtime = self.gpu_runtime.as_ref()?;
        if size < self.config.gpu_min_points {
            return None;
        }
        debug!(?op, size, "dispatching to GPU");
        match f(runtime) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("GPU {op:?} failed ({e:#}), falling back to CPU");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PointOpsError;
    use crate::test_utils::{make_random_sphere, make_xy_plane};

    fn line_points() -> PointSet {
        PointSet::from_rows(&[[0.0, 0.0], [1.0, 0.0], [10.0, 0.0], [11.0, 0.0]]).unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = PointOpsConfig::default();
        assert!(!config.use_gpu);
        assert_eq!(config.gpu_min_points, 10_000);
        assert_eq!(config.kd_tree_min_points, 4096);
    }

    #[test]
    fn test_config_from_json_partial() {
        let config = PointOpsConfig::from_json(r#"{ "kd_tree_min_points": 16 }"#).unwrap();
        assert_eq!(config.kd_tree_min_points, 16);
        assert_eq!(config.gpu_min_points, 10_000);

        let roundtrip = PointOpsConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(roundtrip, config);

        assert!(PointOpsConfig::from_json("{ \"use_gpu\": 3 }").is_err());
    }

    #[test]
    fn test_builder() {
        let ops = PointOps::builder()
            .device_id(1)
            .gpu_min_points(5)
            .kd_tree_min_points(8)
            .build()
            .unwrap();
        assert_eq!(ops.config().device_id, 1);
        assert_eq!(ops.config().gpu_min_points, 5);
        assert_eq!(ops.config().kd_tree_min_points, 8);
        assert!(!ops.has_gpu());
    }

    #[test]
    fn test_gpu_request_without_device_falls_back() {
        let ops = PointOps::builder().use_gpu(true).gpu_min_points(0).build().unwrap();
        let samples = ops.farthest_point_sample(&line_points(), 2).unwrap();
        assert_eq!(samples.as_slice(), &[0, 3]);
    }

    #[test]
    fn test_unknown_device_falls_back_to_cpu() {
        let ops = PointOps::builder()
            .use_gpu(true)
            .device_id(1024)
            .gpu_min_points(0)
            .build()
            .unwrap();
        assert!(!ops.has_gpu());

        let samples = ops.farthest_point_sample(&line_points(), 4).unwrap();
        assert_eq!(samples.as_slice(), &[0, 3, 1, 2]);
    }

    #[test]
    fn test_line_scenarios() {
        let ops = PointOps::new().unwrap();
        let points = line_points();

        let samples = ops.farthest_point_sample(&points, 2).unwrap();
        assert_eq!(samples.as_slice(), &[0, 3]);

        let queries = PointSet::from_rows(&[[0.0, 0.0]]).unwrap();
        let table = ops.ball_query(&points, &queries, 1.5, 2).unwrap();
        assert_eq!(table.row(0), &[0, 1]);
    }

    #[test]
    fn test_kdtree_dispatch_matches_brute_force() {
        let points = PointSet::from_rows(&make_random_sphere([0.0; 3], 4.0, 1500, 12)).unwrap();
        let queries = PointSet::from_rows(&make_random_sphere([0.0; 3], 4.0, 100, 13)).unwrap();

        let kd = PointOps::builder().kd_tree_min_points(1).build().unwrap();
        let brute = PointOps::builder().kd_tree_min_points(usize::MAX).build().unwrap();

        assert_eq!(
            kd.ball_query(&points, &queries, 0.7, 24).unwrap(),
            brute.ball_query(&points, &queries, 0.7, 24).unwrap()
        );
    }

    #[test]
    fn test_pipeline_sample_group_gather_backward() {
        let ops = PointOps::new().unwrap();
        let points = PointSet::from_rows(&make_xy_plane(4.0, 0.5, 0.0)).unwrap();
        let features = points.clone().into_features();

        let centroids = ops.farthest_point_sample(&points, 8).unwrap();
        let centers = ops.gather_points(&points, &centroids).unwrap();
        assert_eq!(centers.len(), 8);

        let groups = ops.ball_query(&points, &centers, 0.6, 4).unwrap();
        let flat = groups.to_index_set();
        let grouped = ops.gather(&features, &flat).unwrap();
        assert_eq!(grouped.shape(), [8 * 4, 3]);

        // Every sampled center lies on a stored point, so no row is unmatched.
        assert!(groups.counts().iter().all(|&c| c >= 1));

        let grad = Features::new(vec![1.0; 8 * 4 * 3], 8 * 4, 3).unwrap();
        let back = ops.gather_backward(&grad, &flat, points.len()).unwrap();
        let total: f32 = back.as_slice().iter().sum();
        assert_eq!(total, (8 * 4 * 3) as f32);
    }

    #[test]
    fn test_errors_downcast_to_point_ops_error() {
        let ops = PointOps::new().unwrap();
        let points = line_points();

        let err = ops.ball_query(&points, &points, 1.0, 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PointOpsError>(),
            Some(PointOpsError::InvalidArgument(_))
        ));

        let buffer = Features::zeros(4, 2).unwrap();
        let err = ops.gather(&buffer, &IndexSet::new(vec![4])).unwrap_err();
        assert_eq!(
            err.downcast_ref::<PointOpsError>(),
            Some(&PointOpsError::IndexOutOfRange { index: 4, len: 4 })
        );

        let grad = Features::zeros(1, 2).unwrap();
        let err = ops.gather_backward(&grad, &IndexSet::new(vec![0]), 0).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PointOpsError>(),
            Some(PointOpsError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_chamfer_through_dispatcher() {
        let ops = PointOps::new().unwrap();
        let x = PointSet::from_rows(&[[0.0, 0.0]]).unwrap();
        let y = PointSet::from_rows(&[[1.0, 0.0], [3.0, 0.0]]).unwrap();

        let result = ops.chamfer_distance(&x, &y).unwrap();
        assert_eq!(result.distance, 6.0);

        let (gx, gy) = ops.chamfer_backward(&x, &y, &result, 1.0).unwrap();
        // dL/dx = 2 (x - y0) + (2 / 2) * ((x - y0) + (x - y1)) = -2 - 1 - 3
        assert_eq!(gx.row(0), &[-6.0, 0.0]);
        // dL/dy0 = -2 (x - y0) + (y0 - x) = 2 + 1; dL/dy1 = (y1 - x) = 3
        assert_eq!(gy.row(0), &[3.0, 0.0]);
        assert_eq!(gy.row(1), &[3.0, 0.0]);
    }

    #[cfg(feature = "profiling")]
    #[test]
    fn test_timing_records_calls() {
        let ops = PointOps::new().unwrap();
        let points = line_points();
        ops.farthest_point_sample(&points, 2).unwrap();
        ops.farthest_point_sample(&points, 3).unwrap();

        let summary = ops.timing_summary();
        assert_eq!(summary.get(OpKind::FarthestPointSample).unwrap().calls, 2);

        ops.reset_timing();
        assert!(ops.timing_summary().ops.is_empty());
    }

    #[cfg(feature = "profiling")]
    #[test]
    fn test_timing_counts_kd_tree_ball_queries() {
        let ops = PointOps::builder().kd_tree_min_points(1).build().unwrap();
        let points = PointSet::from_rows(&make_random_sphere([0.0; 3], 1.0, 50, 7)).unwrap();
        ops.ball_query(&points, &points, 0.3, 4).unwrap();

        let summary = ops.timing_summary();
        let ball = summary.get(OpKind::BallQuery).unwrap();
        assert_eq!(ball.calls, 1);
        assert_eq!(ball.kd_tree_calls, 1);
        assert_eq!(ball.gpu_calls, 0);
    }
}
