use serde::Deserialize;

use crate::{
    error::{DatagenError, Result},
    golden::{BiasMode, GemmShape, Stationarity},
};

use super::{flag, positive};

/// Structural parameters of one OpenGeMM accelerator instance.
#[derive(Clone, Debug, Deserialize)]
pub struct OpenGemmAccConfig {
    /// `[data_type][array_shape] = [meshRow, tileSize, meshCol]`
    pub snax_opengemm_spatial_unrolling: Vec<Vec<[u64; 3]>>,
    pub snax_opengemm_array_input_a_width: u64,
    pub snax_opengemm_array_input_b_width: u64,
    pub snax_opengemm_array_input_c_width: u64,
    pub snax_opengemm_array_output_width: u64,
    pub snax_opengemm_serial_c_d_width: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpenGemmTemplate {
    pub snax_acc_cfg: Vec<OpenGemmAccConfig>,
}

/// Block matrix multiply on OpenGeMM. `M`, `K` and `N` count blocks, not elements.
#[derive(Clone, Debug, Deserialize)]
pub struct MatmulConfig {
    #[serde(rename = "M")]
    pub m: u64,
    #[serde(rename = "K")]
    pub k: u64,
    #[serde(rename = "N")]
    pub n: u64,
    pub array_shape: usize,
    pub data_type: usize,
    pub stationary: u32,
    #[serde(rename = "broadcast_C")]
    pub broadcast_c: u32,
    #[serde(rename = "channel_en_C")]
    pub channel_en_c: u32,
    #[serde(rename = "transposed_A")]
    pub transposed_a: u32,
    #[serde(rename = "transposed_B")]
    pub transposed_b: u32,
    pub snax_opengemm_core_template: OpenGemmTemplate,
}

impl MatmulConfig {
    pub fn accelerator(&self) -> Result<&OpenGemmAccConfig> {
        self.snax_opengemm_core_template
            .snax_acc_cfg
            .first()
            .ok_or_else(|| {
                DatagenError::config(
                    "snax_opengemm_core_template.snax_acc_cfg",
                    "no accelerator is configured",
                )
            })
    }

    /// `[meshRow, tileSize, meshCol]` of the selected data type and array shape.
    pub fn unrolling(&self) -> Result<[u64; 3]> {
        self.accelerator()?
            .snax_opengemm_spatial_unrolling
            .get(self.data_type)
            .and_then(|shapes| shapes.get(self.array_shape))
            .copied()
            .ok_or_else(|| {
                DatagenError::config(
                    "array_shape",
                    format!(
                        "no spatial unrolling for data_type {} and array_shape {}",
                        self.data_type, self.array_shape
                    ),
                )
            })
    }

    pub fn shape(&self) -> Result<GemmShape> {
        let [mesh_row, tile_size, mesh_col] = self.unrolling()?;
        Ok(GemmShape {
            m: self.m as usize,
            k: self.k as usize,
            n: self.n as usize,
            mesh_row: mesh_row as usize,
            tile_size: tile_size as usize,
            mesh_col: mesh_col as usize,
        })
    }

    pub fn stationarity(&self) -> Result<Stationarity> {
        Stationarity::try_from(self.stationary)
    }

    pub fn bias_mode(&self) -> Result<BiasMode> {
        BiasMode::from_flags(
            flag("broadcast_C", self.broadcast_c)?,
            flag("channel_en_C", self.channel_en_c)?,
        )
    }

    pub fn validate(&self) -> Result<()> {
        positive("M", self.m)?;
        positive("K", self.k)?;
        positive("N", self.n)?;
        self.stationarity()?;
        self.bias_mode()?;
        flag("transposed_A", self.transposed_a)?;
        flag("transposed_B", self.transposed_b)?;

        let acc = self.accelerator()?;
        if acc.snax_opengemm_array_input_c_width != acc.snax_opengemm_array_output_width {
            return Err(DatagenError::config(
                "snax_opengemm_array_input_c_width",
                "C and D array widths must be the same",
            ));
        }
        positive(
            "snax_opengemm_serial_c_d_width",
            acc.snax_opengemm_serial_c_d_width,
        )?;
        let [mesh_row, tile_size, mesh_col] = self.unrolling()?;
        positive("meshRow", mesh_row)?;
        positive("tileSize", tile_size)?;
        positive("meshCol", mesh_col)
    }
}
