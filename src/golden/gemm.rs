use ndarray::{s, Array4, ArrayView2, ArrayView4, ArrayViewMut2, Ix4};
use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};

use super::view;

/// Which operand stays in the array while the others stream.
/// Only the streaming order depends on it; the arithmetic result never does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stationarity {
    /// Iterate `m, n, k` (outer to inner).
    #[default]
    Output,
    /// Iterate `n, k, m`.
    Weight,
}

impl TryFrom<u32> for Stationarity {
    type Error = DatagenError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Stationarity::Output),
            1 => Ok(Stationarity::Weight),
            other => Err(DatagenError::config(
                "stationary",
                format!("{other} is neither 0 (output) nor 1 (weight)"),
            )),
        }
    }
}

/// Block counts and array dimensions of a tiled matrix multiply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GemmShape {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub mesh_row: usize,
    pub tile_size: usize,
    pub mesh_col: usize,
}

impl GemmShape {
    pub fn a_dims(&self) -> Ix4 {
        Ix4(self.m, self.k, self.mesh_row, self.tile_size)
    }

    pub fn b_dims(&self) -> Ix4 {
        Ix4(self.k, self.n, self.tile_size, self.mesh_col)
    }

    pub fn c_dims(&self) -> Ix4 {
        Ix4(self.m, self.n, self.mesh_row, self.mesh_col)
    }

    pub fn a_len(&self) -> usize {
        self.m * self.k * self.mesh_row * self.tile_size
    }

    pub fn b_len(&self) -> usize {
        self.k * self.n * self.tile_size * self.mesh_col
    }

    pub fn c_len(&self) -> usize {
        self.m * self.n * self.mesh_row * self.mesh_col
    }
}

/// Options of the hardware operand path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GemmOptions {
    pub subtraction_a: i8,
    pub subtraction_b: i8,
    pub transposed_a: bool,
    pub transposed_b: bool,
    pub stationarity: Stationarity,
}

/// `acc += (a - sa) · (b - sb)` for one `(mesh_row × tile_size) · (tile_size × mesh_col)` tile, in 32-bit wrapping
/// arithmetic like the array's adder tree.
pub(crate) fn mac_tile(
    mut acc: ArrayViewMut2<i32>,
    a: ArrayView2<i8>,
    b: ArrayView2<i8>,
    subtraction_a: i8,
    subtraction_b: i8,
) {
    for ((row, col), out) in acc.indexed_iter_mut() {
        let partial = a
            .row(row)
            .iter()
            .zip(b.column(col).iter())
            .fold(0i32, |sum, (x, y)| {
                let lhs = *x as i32 - subtraction_a as i32;
                let rhs = *y as i32 - subtraction_b as i32;
                sum.wrapping_add(lhs.wrapping_mul(rhs))
            });
        *out = out.wrapping_add(partial);
    }
}

/// Transposes every tile in memory and reads the result back with the untransposed block dimensions.
/// A non-square tile therefore changes which elements share a row, as it does in the operand buffer.
fn retile<T: Copy>(what: &str, blocks: ArrayView4<T>) -> Result<Array4<T>> {
    let dims = blocks.raw_dim();
    let len = blocks.len();
    blocks
        .permuted_axes([0, 1, 3, 2])
        .as_standard_layout()
        .into_owned()
        .into_shape(dims)
        .map_err(|_| DatagenError::ShapeMismatch {
            what: what.to_string(),
            expected: len as u64,
            actual: len as u64,
        })
}

/// `D = A·B + C` over blocked operands laid out as A `(M, K, meshRow, tileSize)`, B `(K, N, tileSize, meshCol)` and
/// C/D `(M, N, meshRow, meshCol)`.
pub fn block_gemm(
    shape: &GemmShape,
    a: &[i8],
    b: &[i8],
    c: &[i32],
    options: &GemmOptions,
) -> Result<Array4<i32>> {
    let a = view("A", a, shape.a_dims())?;
    let b = view("B", b, shape.b_dims())?;
    let c = view("C", c, shape.c_dims())?;

    let a = if options.transposed_a {
        retile("A", a)?
    } else {
        a.to_owned()
    };
    let b = if options.transposed_b {
        retile("B", b)?
    } else {
        b.to_owned()
    };

    let mut d = c.to_owned();
    let mut step = |m: usize, n: usize, k: usize| {
        mac_tile(
            d.slice_mut(s![m, n, .., ..]),
            a.slice(s![m, k, .., ..]),
            b.slice(s![k, n, .., ..]),
            options.subtraction_a,
            options.subtraction_b,
        )
    };
    match options.stationarity {
        Stationarity::Output => {
            for m in 0..shape.m {
                for n in 0..shape.n {
                    for k in 0..shape.k {
                        step(m, n, k);
                    }
                }
            }
        }
        Stationarity::Weight => {
            for n in 0..shape.n {
                for k in 0..shape.k {
                    for m in 0..shape.m {
                        step(m, n, k);
                    }
                }
            }
        }
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use crate::error::DatagenError;

    use super::{block_gemm, GemmOptions, GemmShape, Stationarity};

    fn shape() -> GemmShape {
        GemmShape {
            m: 2,
            k: 3,
            n: 2,
            mesh_row: 2,
            tile_size: 2,
            mesh_col: 2,
        }
    }

    fn operands(shape: &GemmShape) -> (Vec<i8>, Vec<i8>, Vec<i32>) {
        let a = (0..shape.a_len()).map(|i| (i % 7) as i8 - 3).collect();
        let b = (0..shape.b_len()).map(|i| (i % 5) as i8 - 2).collect();
        let c = (0..shape.c_len()).map(|i| i as i32).collect();
        (a, b, c)
    }

    /// Flattens the blocked operands to plain row-major matrices and multiplies them naively.
    fn reference(shape: &GemmShape, a: &[i8], b: &[i8], c: &[i32]) -> Vec<i32> {
        let (mr, ts, mc) = (shape.mesh_row, shape.tile_size, shape.mesh_col);
        let mut d = c.to_vec();
        for m in 0..shape.m {
            for n in 0..shape.n {
                for r in 0..mr {
                    for col in 0..mc {
                        let mut sum = 0i32;
                        for k in 0..shape.k {
                            for t in 0..ts {
                                let av = a[((m * shape.k + k) * mr + r) * ts + t] as i32;
                                let bv = b[((k * shape.n + n) * ts + t) * mc + col] as i32;
                                sum += av * bv;
                            }
                        }
                        d[((m * shape.n + n) * mr + r) * mc + col] += sum;
                    }
                }
            }
        }
        d
    }

    #[test]
    fn matches_naive_product() {
        let shape = shape();
        let (a, b, c) = operands(&shape);
        let d = block_gemm(&shape, &a, &b, &c, &GemmOptions::default()).unwrap();
        assert_eq!(d.into_raw_vec(), reference(&shape, &a, &b, &c));
    }

    #[test]
    fn stationarity_does_not_change_results() {
        let shape = shape();
        let (a, b, c) = operands(&shape);
        let os = block_gemm(&shape, &a, &b, &c, &GemmOptions::default()).unwrap();
        let ws = block_gemm(
            &shape,
            &a,
            &b,
            &c,
            &GemmOptions {
                stationarity: Stationarity::Weight,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(os, ws);
    }

    #[test]
    fn transposed_a_swaps_intra_tile_axes() {
        let shape = shape();
        let (a, b, c) = operands(&shape);
        let mut swapped = a.clone();
        let (mr, ts) = (shape.mesh_row, shape.tile_size);
        for block in 0..shape.m * shape.k {
            for r in 0..mr {
                for t in 0..ts {
                    swapped[block * mr * ts + t * mr + r] = a[block * mr * ts + r * ts + t];
                }
            }
        }
        let transposed = block_gemm(
            &shape,
            &a,
            &b,
            &c,
            &GemmOptions {
                transposed_a: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(transposed.into_raw_vec(), reference(&shape, &swapped, &b, &c));
    }

    #[test]
    fn non_square_tiles_are_transposed_in_memory() {
        let shape = GemmShape {
            m: 1,
            k: 1,
            n: 1,
            mesh_row: 2,
            tile_size: 4,
            mesh_col: 2,
        };
        let (a, b, c) = operands(&shape);
        // the 2x4 tile of A stored as its 4x2 transpose, then read back as 2x4
        let mut flat = vec![0i8; a.len()];
        for r in 0..2 {
            for t in 0..4 {
                flat[t * 2 + r] = a[r * 4 + t];
            }
        }
        let d = block_gemm(
            &shape,
            &a,
            &b,
            &c,
            &GemmOptions {
                transposed_a: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(d.into_raw_vec(), reference(&shape, &flat, &b, &c));

        // same for a 4x2 tile of B
        let mut flat = vec![0i8; b.len()];
        for t in 0..4 {
            for col in 0..2 {
                flat[col * 4 + t] = b[t * 2 + col];
            }
        }
        let d = block_gemm(
            &shape,
            &a,
            &b,
            &c,
            &GemmOptions {
                transposed_b: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(d.into_raw_vec(), reference(&shape, &a, &flat, &c));
    }

    #[test]
    fn operand_lengths_are_checked() {
        let shape = shape();
        let (a, b, c) = operands(&shape);
        let result = block_gemm(&shape, &a[1..], &b, &c, &GemmOptions::default());
        assert!(matches!(result, Err(DatagenError::ShapeMismatch { .. })));
    }

    #[test]
    fn zero_point_subtraction() {
        let shape = GemmShape {
            m: 1,
            k: 1,
            n: 1,
            mesh_row: 1,
            tile_size: 2,
            mesh_col: 1,
        };
        let d = block_gemm(
            &shape,
            &[3, 4],
            &[5, 6],
            &[0],
            &GemmOptions {
                subtraction_a: 1,
                subtraction_b: 2,
                ..Default::default()
            },
        )
        .unwrap();
        // (3-1)(5-2) + (4-1)(6-2)
        assert_eq!(d.into_raw_vec(), vec![18]);
    }
}
