use std::{fmt::Display, str::FromStr};

use serde::Deserialize;

use crate::error::{DatagenError, Result};

use super::positive;

/// Byte size of the square blocks the XDMA moves per temporal step.
pub const BLOCK: u64 = 8;

/// Memory layout of a `rows × cols` byte matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `NM`: plain row-major.
    RowMajor,
    /// `NMN<width>x<height>`: row-major grid of row-major tiles, each `width` bytes wide and `height` rows tall.
    Tiled { width: u64, height: u64 },
}

impl FromStr for Layout {
    type Err = DatagenError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "NM" {
            return Ok(Layout::RowMajor);
        }
        let invalid = || DatagenError::config("layout", format!("`{s}` is neither NM nor NMN<w>x<h>"));
        let (width, height) = s
            .strip_prefix("NMN")
            .and_then(|dims| dims.split_once('x'))
            .ok_or_else(invalid)?;
        Ok(Layout::Tiled {
            width: width.parse().map_err(|_| invalid())?,
            height: height.parse().map_err(|_| invalid())?,
        })
    }
}

impl Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::RowMajor => f.write_str("NM"),
            Layout::Tiled { width, height } => write!(f, "NMN{width}x{height}"),
        }
    }
}

impl Layout {
    /// Byte offset of element `(row, col)` of a matrix with `cols` columns.
    pub fn offset(&self, row: u64, col: u64, cols: u64) -> u64 {
        match *self {
            Layout::RowMajor => row * cols + col,
            Layout::Tiled { width, height } => {
                (row / height) * cols * height
                    + (col / width) * height * width
                    + (row % height) * width
                    + col % width
            }
        }
    }

    /// Checks that the layout tiles a `rows × cols` matrix into whole blocks.
    pub fn validate(&self, key: &str, rows: u64, cols: u64) -> Result<()> {
        if let Layout::Tiled { width, height } = *self {
            if width == 0 || height == 0 || width % BLOCK != 0 || height % BLOCK != 0 {
                return Err(DatagenError::config(
                    key,
                    format!("tile {width}x{height} is not made of {BLOCK}x{BLOCK} blocks"),
                ));
            }
            if cols % width != 0 || rows % height != 0 {
                return Err(DatagenError::config(
                    key,
                    format!("tile {width}x{height} does not divide a {rows}x{cols} matrix"),
                ));
            }
        }
        Ok(())
    }
}

/// Matrix relayout (and optional transposition) through the XDMA.
#[derive(Clone, Debug, Deserialize)]
pub struct TransposeConfig {
    /// Rows of the source matrix.
    #[serde(rename = "M")]
    pub m: u64,
    /// Columns of the source matrix, in bytes.
    #[serde(rename = "N")]
    pub n: u64,
    pub input_layout: String,
    pub output_layout: String,
    pub enable_transpose: bool,
}

impl TransposeConfig {
    pub fn input(&self) -> Result<Layout> {
        self.input_layout
            .parse()
            .map_err(|_| DatagenError::config("input_layout", format!("unknown layout `{}`", self.input_layout)))
    }

    pub fn output(&self) -> Result<Layout> {
        self.output_layout
            .parse()
            .map_err(|_| DatagenError::config("output_layout", format!("unknown layout `{}`", self.output_layout)))
    }

    pub fn validate(&self) -> Result<()> {
        positive("M", self.m)?;
        positive("N", self.n)?;
        if self.m % BLOCK != 0 || self.n % BLOCK != 0 {
            return Err(DatagenError::config(
                "M/N",
                format!("{}x{} is not made of {BLOCK}x{BLOCK} blocks", self.m, self.n),
            ));
        }
        let (input, output) = (self.input()?, self.output()?);
        input.validate("input_layout", self.m, self.n)?;
        let (out_rows, out_cols) = if self.enable_transpose {
            (self.n, self.m)
        } else {
            (self.m, self.n)
        };
        output.validate("output_layout", out_rows, out_cols)?;

        // both sides walk the same block sequence, so the destination must mirror the source
        let expected = match (input, self.enable_transpose) {
            (layout, false) => layout,
            (Layout::RowMajor, true) => Layout::RowMajor,
            (Layout::Tiled { width, height }, true) => Layout::Tiled {
                width: height,
                height: width,
            },
        };
        if output != expected {
            return Err(DatagenError::config(
                "output_layout",
                format!("{input} can only be moved to {expected}, not {output}"),
            ));
        }
        Ok(())
    }
}
