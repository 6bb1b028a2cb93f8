use ndarray::{s, Array5, Ix5, Ix6};

use crate::error::{DatagenError, Result};

use super::{gemm::mac_tile, view};

/// A 2D convolution mapped onto the GeMM array.
///
/// Channels are tiled: the input is stored as `(N, Cin/tileSize, H, W, tileSize)`, the kernel as
/// `(Cout/meshCol, Cin/tileSize, Kh, Kw, meshCol, tileSize)` and the output as `(N, Cout/meshCol, OH, OW, meshCol)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvShape {
    pub nbatch: usize,
    pub cin: usize,
    pub h: usize,
    pub w: usize,
    pub cout: usize,
    pub kh: usize,
    pub kw: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_h: usize,
    pub pad_w: usize,
    pub mesh_row: usize,
    pub tile_size: usize,
    pub mesh_col: usize,
}

impl ConvShape {
    pub fn cin_tiles(&self) -> usize {
        self.cin / self.tile_size
    }

    pub fn cout_tiles(&self) -> usize {
        self.cout / self.mesh_col
    }

    pub fn padded_h(&self) -> usize {
        self.h + 2 * self.pad_h
    }

    pub fn padded_w(&self) -> usize {
        self.w + 2 * self.pad_w
    }

    pub fn out_height(&self) -> Result<usize> {
        out_extent("Kh", self.padded_h(), self.kh, self.stride_h)
    }

    pub fn out_width(&self) -> Result<usize> {
        out_extent("Kw", self.padded_w(), self.kw, self.stride_w)
    }

    /// GeMM block counts `(M, K, N)` of the implicit im2col product.
    pub fn gemm_dims(&self) -> Result<(usize, usize, usize)> {
        Ok((
            self.nbatch * self.out_height()? * self.out_width()? / self.mesh_row,
            self.cin_tiles() * self.kh * self.kw,
            self.cout_tiles(),
        ))
    }

    pub fn input_dims(&self) -> Ix5 {
        Ix5(self.nbatch, self.cin_tiles(), self.h, self.w, self.tile_size)
    }

    pub fn padded_dims(&self) -> Ix5 {
        Ix5(
            self.nbatch,
            self.cin_tiles(),
            self.padded_h(),
            self.padded_w(),
            self.tile_size,
        )
    }

    pub fn kernel_dims(&self) -> Ix6 {
        Ix6(
            self.cout_tiles(),
            self.cin_tiles(),
            self.kh,
            self.kw,
            self.mesh_col,
            self.tile_size,
        )
    }

    pub fn output_dims(&self) -> Result<Ix5> {
        Ok(Ix5(
            self.nbatch,
            self.cout_tiles(),
            self.out_height()?,
            self.out_width()?,
            self.mesh_col,
        ))
    }

    /// Widens `w` until the output width is a multiple of `mesh_row`.
    pub fn with_adjusted_width(mut self) -> Self {
        let cols = self.w / self.stride_w;
        if cols % self.mesh_row != 0 {
            let step = self.stride_w * self.mesh_row;
            self.w += (self.stride_w * (self.mesh_row - cols % self.mesh_row)) % step;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("Nbatch", self.nbatch),
            ("Cin", self.cin),
            ("H", self.h),
            ("W", self.w),
            ("Cout", self.cout),
            ("Kh", self.kh),
            ("Kw", self.kw),
            ("stride_h", self.stride_h),
            ("stride_w", self.stride_w),
            ("meshRow", self.mesh_row),
            ("tileSize", self.tile_size),
            ("meshCol", self.mesh_col),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(DatagenError::config(*key, "must be positive"));
        }
        if self.cin % self.tile_size != 0 {
            return Err(DatagenError::config(
                "Cin",
                format!("{} is not a multiple of tileSize {}", self.cin, self.tile_size),
            ));
        }
        if self.cout % self.mesh_col != 0 {
            return Err(DatagenError::config(
                "Cout",
                format!("{} is not a multiple of meshCol {}", self.cout, self.mesh_col),
            ));
        }
        self.out_height()?;
        let out_width = self.out_width()?;
        if out_width % self.mesh_row != 0 {
            return Err(DatagenError::config(
                "W",
                format!(
                    "output width {} is not a multiple of meshRow {}",
                    out_width, self.mesh_row
                ),
            ));
        }
        Ok(())
    }

    /// Zero-pads the spatial dimensions of an input tensor.
    pub fn pad_input(&self, input: &[i8]) -> Result<Array5<i8>> {
        let input = view("input", input, self.input_dims())?;
        let mut padded = Array5::<i8>::zeros(self.padded_dims());
        padded
            .slice_mut(s![
                ..,
                ..,
                self.pad_h..self.pad_h + self.h,
                self.pad_w..self.pad_w + self.w,
                ..
            ])
            .assign(&input);
        Ok(padded)
    }
}

/// Number of kernel positions along one padded axis.
fn out_extent(key: &str, padded: usize, kernel: usize, stride: usize) -> Result<usize> {
    if stride == 0 {
        return Err(DatagenError::config(key, "stride must be positive"));
    }
    padded
        .checked_sub(kernel)
        .map(|span| span / stride + 1)
        .ok_or_else(|| {
            DatagenError::config(
                key,
                format!("kernel extent {kernel} is larger than the padded input {padded}"),
            )
        })
}

/// Convolution golden result, before bias.
///
/// Every `meshRow` consecutive output pixels of a row form one GeMM row block. The matching input tile is a strided
/// view into the padded input, so the im2col matrix is never materialized.
pub fn conv2d(shape: &ConvShape, input: &[i8], kernel: &[i8]) -> Result<Array5<i32>> {
    shape.validate()?;
    let padded = shape.pad_input(input)?;
    let kernel = view("kernel", kernel, shape.kernel_dims())?;

    let (mr, sw, sh) = (shape.mesh_row, shape.stride_w, shape.stride_h);
    let (oh, ow) = (shape.out_height()?, shape.out_width()?);
    let mut out = Array5::<i32>::zeros(shape.output_dims()?);
    for n in 0..shape.nbatch {
        for co in 0..shape.cout_tiles() {
            for oy in 0..oh {
                for block in 0..ow / mr {
                    let ox = block * mr;
                    for ci in 0..shape.cin_tiles() {
                        for ky in 0..shape.kh {
                            for kx in 0..shape.kw {
                                let x0 = ox * sw + kx;
                                let a = padded.slice(s![
                                    n,
                                    ci,
                                    oy * sh + ky,
                                    x0..x0 + (mr - 1) * sw + 1;sw,
                                    ..
                                ]);
                                let b = kernel.slice(s![co, ci, ky, kx, .., ..]);
                                mac_tile(
                                    out.slice_mut(s![n, co, oy, ox..ox + mr, ..]),
                                    a,
                                    b.t(),
                                    0,
                                    0,
                                );
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(out)
}
