//! Golden results: what the accelerator must produce, bit for bit.
//!
//! GeMM and convolution results are computed here. Results of the floating point datapaths come from an external
//! simulator and are read back with a [GoldenLoader].

mod bias;
mod conv;
mod gemm;
mod loader;

pub use bias::BiasMode;
pub use conv::{conv2d, ConvShape};
pub use gemm::{block_gemm, GemmOptions, GemmShape, Stationarity};
pub use loader::{parse_golden, GoldenLoader};

use ndarray::{ArrayView, Dimension};

use crate::error::{DatagenError, Result};

/// Views a flat buffer with the given shape, reporting a length mismatch as a shape error.
pub(crate) fn view<'a, T, D: Dimension>(
    what: &str,
    data: &'a [T],
    dims: D,
) -> Result<ArrayView<'a, T, D>> {
    let expected = dims.size();
    ArrayView::from_shape(dims, data).map_err(|_| DatagenError::ShapeMismatch {
        what: what.to_string(),
        expected: expected as u64,
        actual: data.len() as u64,
    })
}
