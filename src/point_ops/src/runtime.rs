//! GPU runtime management for CubeCL CUDA execution.
//!
//! Owns the CUDA compute client and wraps every kernel launch:
//! upload, launch, read back, convert into the crate's buffer types.
//! Inputs are validated with the same checks as the CPU paths before any
//! device memory is touched.
//!
//! # Example
//!
//! ```ignore
//! use point_ops::runtime::GpuRuntime;
//!
//! let runtime = GpuRuntime::new()?;
//! let samples = runtime.farthest_point_sample(&points, 1024)?;
//! ```

use anyhow::{anyhow, ensure, Context, Result};
use cubecl::client::ComputeClient;
use cubecl::cuda::{CudaDevice, CudaRuntime};
use cubecl::prelude::*;

use crate::ball_query::kernels::ball_query_kernel;
use crate::ball_query::validate_ball_query;
use crate::gather::kernels::{gather_rows_kernel, scatter_add_rows_kernel};
use crate::gather::{validate_gather_backward, ScatterPlan};
use crate::sampling::kernels::{farthest_point_sample_kernel, FPS_CUBE_DIM};
use crate::types::{Features, IndexSet, NeighborTable, PointSet};

/// Type alias for CUDA compute client
type CudaClient = ComputeClient<<CudaRuntime as Runtime>::Server>;

/// Units per cube for element-wise kernels.
const CUBE_DIM: u32 = 256;

/// GPU runtime for point operations.
pub struct GpuRuntime {
    /// CUDA device (kept alive for runtime lifetime)
    #[allow(dead_code)]
    device: CudaDevice,
    client: CudaClient,
}

impl GpuRuntime {
    /// Create a new GPU runtime with the default CUDA device.
    pub fn new() -> Result<Self> {
        Self::with_device_id(0)
    }

    /// Create a new GPU runtime with a specific CUDA device.
    ///
    /// Fails when the driver is missing or `device_id` does not name a device.
    pub fn with_device_id(device_id: usize) -> Result<Self> {
        // CubeCL panics instead of returning an error on device setup.
        let (device, client) = std::panic::catch_unwind(|| {
            let device = CudaDevice::new(device_id);
            let client = CudaRuntime::client(&device);
            (device, client)
        })
        .map_err(|_| anyhow!("failed to initialize CUDA device {device_id}"))?;

        Ok(Self { device, client })
    }

    /// Get the underlying compute client.
    pub fn client(&self) -> &CudaClient {
        &self.client
    }

    /// Farthest-point sampling in a single cube.
    pub fn farthest_point_sample(&self, points: &PointSet, num_samples: usize) -> Result<IndexSet> {
        let n = points.len();
        let m = num_samples.min(n);
        if m == 0 {
            return Ok(IndexSet::default());
        }
        let flat = points.as_flat();
        ensure_u32(flat.len(), "point coordinates")?;

        let points_gpu = self.client.create(f32::as_bytes(flat));
        let dist_gpu = self.client.create(f32::as_bytes(&vec![f32::INFINITY; n]));
        let output_gpu = self.client.empty(m * std::mem::size_of::<u32>());

        unsafe {
            farthest_point_sample_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                CubeCount::Static(1, 1, 1),
                CubeDim::new(FPS_CUBE_DIM, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&points_gpu, flat.len(), 1),
                ArrayArg::from_raw_parts::<f32>(&dist_gpu, n, 1),
                ScalarArg::new(n as u32),
                ScalarArg::new(points.dim() as u32),
                ScalarArg::new(m as u32),
                ArrayArg::from_raw_parts::<u32>(&output_gpu, m, 1),
            );
        }

        let output_bytes = self.client.read_one(output_gpu);
        Ok(IndexSet::new(u32::from_bytes(&output_bytes).to_vec()))
    }

    /// Brute-force ball query, one unit per query.
    pub fn ball_query(
        &self,
        points: &PointSet,
        queries: &PointSet,
        radius: f32,
        k: usize,
    ) -> Result<NeighborTable> {
        validate_ball_query(points, queries, radius, k)?;

        let num_queries = queries.len();
        let out_len = num_queries * k;
        ensure_u32(points.as_flat().len(), "point coordinates")?;
        ensure_u32(queries.as_flat().len(), "query coordinates")?;
        ensure_u32(out_len, "neighbor table")?;

        let points_gpu = self.client.create(f32::as_bytes(points.as_flat()));
        let queries_gpu = self.client.create(f32::as_bytes(queries.as_flat()));
        let indices_gpu = self.client.empty(out_len * std::mem::size_of::<u32>());
        let counts_gpu = self.client.empty(num_queries * std::mem::size_of::<u32>());

        let cube_count = (num_queries as u32).div_ceil(CUBE_DIM);
        unsafe {
            ball_query_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                CubeCount::Static(cube_count, 1, 1),
                CubeDim::new(CUBE_DIM, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&points_gpu, points.as_flat().len(), 1),
                ArrayArg::from_raw_parts::<f32>(&queries_gpu, queries.as_flat().len(), 1),
                ScalarArg::new(radius * radius),
                ScalarArg::new(points.len() as u32),
                ScalarArg::new(num_queries as u32),
                ScalarArg::new(points.dim() as u32),
                ScalarArg::new(k as u32),
                ArrayArg::from_raw_parts::<u32>(&indices_gpu, out_len, 1),
                ArrayArg::from_raw_parts::<u32>(&counts_gpu, num_queries, 1),
            );
        }

        let indices = u32::from_bytes(&self.client.read_one(indices_gpu)).to_vec();
        let counts = u32::from_bytes(&self.client.read_one(counts_gpu)).to_vec();
        ensure!(
            indices.len() == out_len && counts.len() == num_queries,
            "ball query read back {} indices and {} counts, expected {out_len} and {num_queries}",
            indices.len(),
            counts.len()
        );

        Ok(NeighborTable::from_parts(indices, counts, k))
    }

    /// Row gather, one unit per output element.
    pub fn gather(&self, buffer: &Features, indices: &IndexSet) -> Result<Features> {
        indices.check_bounds(buffer.rows())?;

        let cols = buffer.cols();
        let num_elements = indices.len() * cols;
        if num_elements == 0 {
            return Ok(Features::zeros(0, cols)?);
        }
        ensure_u32(buffer.as_slice().len(), "gather source")?;
        ensure_u32(num_elements, "gather output")?;

        let buffer_gpu = self.client.create(f32::as_bytes(buffer.as_slice()));
        let indices_gpu = self.client.create(u32::as_bytes(indices.as_slice()));
        let output_gpu = self.client.empty(num_elements * std::mem::size_of::<f32>());

        let cube_count = (num_elements as u32).div_ceil(CUBE_DIM);
        unsafe {
            gather_rows_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                CubeCount::Static(cube_count, 1, 1),
                CubeDim::new(CUBE_DIM, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&buffer_gpu, buffer.as_slice().len(), 1),
                ArrayArg::from_raw_parts::<u32>(&indices_gpu, indices.len(), 1),
                ScalarArg::new(cols as u32),
                ScalarArg::new(num_elements as u32),
                ArrayArg::from_raw_parts::<f32>(&output_gpu, num_elements, 1),
            );
        }

        let output = f32::from_bytes(&self.client.read_one(output_gpu)).to_vec();
        Features::new(output, indices.len(), cols).context("gather read back")
    }

    /// Gather adjoint as a segmented sum over a host-built scatter plan.
    pub fn gather_backward(
        &self,
        grad_output: &Features,
        indices: &IndexSet,
        num_rows: usize,
    ) -> Result<Features> {
        validate_gather_backward(grad_output, indices, num_rows)?;

        let cols = grad_output.cols();
        if indices.is_empty() {
            return Ok(Features::zeros(num_rows, cols)?);
        }
        let plan = ScatterPlan::new(indices, num_rows)?;

        let num_elements = num_rows * cols;
        ensure_u32(num_elements, "gather-backward output")?;
        ensure_u32(grad_output.as_slice().len(), "gradient")?;

        let grad_gpu = self.client.create(f32::as_bytes(grad_output.as_slice()));
        let order_gpu = self.client.create(u32::as_bytes(plan.order()));
        let offsets_gpu = self.client.create(u32::as_bytes(plan.offsets()));
        let output_gpu = self.client.empty(num_elements * std::mem::size_of::<f32>());

        let cube_count = (num_elements as u32).div_ceil(CUBE_DIM);
        unsafe {
            scatter_add_rows_kernel::launch_unchecked::<f32, CudaRuntime>(
                &self.client,
                CubeCount::Static(cube_count, 1, 1),
                CubeDim::new(CUBE_DIM, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&grad_gpu, grad_output.as_slice().len(), 1),
                ArrayArg::from_raw_parts::<u32>(&order_gpu, plan.order().len(), 1),
                ArrayArg::from_raw_parts::<u32>(&offsets_gpu, plan.offsets().len(), 1),
                ScalarArg::new(cols as u32),
                ScalarArg::new(num_elements as u32),
                ArrayArg::from_raw_parts::<f32>(&output_gpu, num_elements, 1),
            );
        }

        let output = f32::from_bytes(&self.client.read_one(output_gpu)).to_vec();
        Features::new(output, num_rows, cols).context("gather-backward read back")
    }
}

/// Kernels index with u32.
fn ensure_u32(len: usize, what: &str) -> Result<()> {
    ensure!(
        len <= u32::MAX as usize,
        "{what} has {len} elements, more than a u32 kernel index can address"
    );
    Ok(())
}

/// Check if CUDA is available on this system.
pub fn is_cuda_available() -> bool {
    // Creating a device panics when no driver or device is present.
    std::panic::catch_unwind(|| {
        let _device = CudaDevice::new(0);
    })
    .is_ok()
}
