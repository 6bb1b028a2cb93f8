use crate::{
    config::{GeneratorOptions, Layout, TransposeConfig, BLOCK},
    emit::HeaderBuilder,
    error::Result,
    streamer::{synthesize, LoopNest, StreamerDescriptor},
    types::CType,
};

use super::Generate;

/// Matrix relayout through the XDMA: a source and a destination descriptor moving `8 × 8` byte blocks.
pub struct TransposeWorkload {
    config: TransposeConfig,
    input: Layout,
    output: Layout,
}

/// Block walk over an `M × N` source matrix stored in `layout`.
pub(crate) fn source_nest(layout: Layout, m: u64, n: u64) -> LoopNest {
    let b = BLOCK as i64;
    match layout {
        Layout::RowMajor => {
            LoopNest::new([(n / BLOCK, b), (m / BLOCK, n as i64 * b)]).with_spatial_stride(n as i64)
        }
        Layout::Tiled { width, height } => {
            let (w, h) = (width as i64, height as i64);
            LoopNest::new([
                (width / BLOCK, b),
                (height / BLOCK, w * b),
                (n / width, h * w),
                (m / height, n as i64 * h),
            ])
            .with_spatial_stride(w)
        }
    }
}

/// Where the destination puts each block of [source_nest], in the same order.
pub(crate) fn destination_nest(input: Layout, m: u64, n: u64, transpose: bool) -> LoopNest {
    if !transpose {
        return source_nest(input, m, n);
    }
    let b = BLOCK as i64;
    match input {
        Layout::RowMajor => {
            LoopNest::new([(n / BLOCK, m as i64 * b), (m / BLOCK, b)]).with_spatial_stride(m as i64)
        }
        Layout::Tiled { width, height } => {
            let (w, h) = (width as i64, height as i64);
            LoopNest::new([
                (width / BLOCK, h * b),
                (height / BLOCK, b),
                (n / width, w * m as i64),
                (m / height, w * h),
            ])
            .with_spatial_stride(h)
        }
    }
}

impl TransposeWorkload {
    pub fn new(config: TransposeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            input: config.input()?,
            output: config.output()?,
            config,
        })
    }

    fn descriptor(&self, what: &str, nest: &LoopNest, bank_bytes: u64) -> Result<StreamerDescriptor> {
        let (m, n) = (self.config.m, self.config.n);
        nest.expect_elements(what, m * n / (BLOCK * BLOCK))?;
        synthesize(what, nest, nest.depth(), bank_bytes)
    }

    /// The source matrix as stored, and the matrix the destination must hold afterwards.
    pub(crate) fn matrices(&self, rng: &mut fastrand::Rng) -> (Vec<u8>, Vec<u8>) {
        let (m, n) = (self.config.m, self.config.n);
        let mut input = vec![0u8; (m * n) as usize];
        let mut golden = vec![0u8; (m * n) as usize];
        for row in 0..m {
            for col in 0..n {
                let value = rng.u8(..);
                input[self.input.offset(row, col, n) as usize] = value;
                let at = if self.config.enable_transpose {
                    self.output.offset(col, row, m)
                } else {
                    self.output.offset(row, col, n)
                };
                golden[at as usize] = value;
            }
        }
        (input, golden)
    }
}

impl Generate for TransposeWorkload {
    fn name(&self) -> &'static str {
        "transpose"
    }

    fn generate(&self, options: &GeneratorOptions, header: &mut HeaderBuilder) -> Result<usize> {
        let (m, n) = (self.config.m, self.config.n);
        let transpose = self.config.enable_transpose;
        let src = self.descriptor("src", &source_nest(self.input, m, n), options.bank_bytes())?;
        let dst = self.descriptor(
            "dst",
            &destination_nest(self.input, m, n, transpose),
            options.bank_bytes(),
        )?;

        let mut rng = fastrand::Rng::with_seed(options.seed);
        let (input, golden) = self.matrices(&mut rng);

        header.scalar(CType::UInt32, "matrix_size", m * n)?;
        for (side, desc) in [("src", &src), ("dst", &dst)] {
            header.scalar(CType::UInt32, format!("spatial_stride_{side}"), desc.spatial_stride())?;
        }
        for (side, desc) in [("src", &src), ("dst", &dst)] {
            header.param_array(CType::UInt32, format!("temporal_bounds_{side}"), desc.bounds().iter().copied())?;
        }
        for (side, desc) in [("src", &src), ("dst", &dst)] {
            header.param_array(
                CType::UInt32,
                format!("temporal_strides_{side}"),
                desc.strides().iter().copied(),
            )?;
        }
        for (side, desc) in [("src", &src), ("dst", &dst)] {
            header.scalar(CType::UInt32, format!("temporal_dimension_{side}"), desc.depth())?;
        }
        header
            .scalar(CType::UInt8, "enable_transpose", transpose as u8)?
            .tensor("input_matrix", &input)?
            .tensor("golden_output_matrix", &golden)?;
        Ok(1)
    }
}
