//! GPU kernels for gather and its adjoint using CubeCL.
//!
//! Gather-backward does not use atomics. The host groups source rows by
//! destination (see [`super::ScatterPlan`]) and every unit owns one output
//! element, summing its contributors in ascending order.

use cubecl::prelude::*;

/// Copy rows: `output[m, f] = buffer[indices[m], f]`.
///
/// One unit per output element. Indices are bounds-checked on the host.
#[cube(launch_unchecked)]
pub fn gather_rows_kernel<F: Float>(
    buffer: &Array<F>,     // [N * cols]
    indices: &Array<u32>,  // [M]
    cols: u32,             // row width
    num_elements: u32,     // M * cols
    output: &mut Array<F>, // [M * cols]
) {
    let idx = ABSOLUTE_POS;

    if idx >= num_elements {
        terminate!();
    }

    let m = idx / cols;
    let f = idx % cols;
    let src = indices[m];
    output[idx] = buffer[src * cols + f];
}

/// Segmented sum: `output[n, f] = sum(grad[order[j], f])` for
/// `j in offsets[n]..offsets[n + 1]`.
///
/// One unit per output element, so no two units write the same address.
#[cube(launch_unchecked)]
pub fn scatter_add_rows_kernel<F: Float>(
    grad: &Array<F>,       // [M * cols]
    order: &Array<u32>,    // [M] source rows grouped by destination
    offsets: &Array<u32>,  // [N + 1] group boundaries into `order`
    cols: u32,             // row width
    num_elements: u32,     // N * cols
    output: &mut Array<F>, // [N * cols]
) {
    let idx = ABSOLUTE_POS;

    if idx >= num_elements {
        terminate!();
    }

    let n = idx / cols;
    let f = idx % cols;

    let mut acc = F::new(0.0);
    for j in offsets[n]..offsets[n + 1] {
        acc += grad[order[j] * cols + f];
    }
    output[idx] = acc;
}
