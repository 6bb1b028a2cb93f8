use serde::Deserialize;

use crate::{
    error::{DatagenError, Result},
    golden::{BiasMode, ConvShape},
};

use super::{flag, positive};

/// Structural parameters of one GeMMX accelerator instance.
#[derive(Clone, Debug, Deserialize)]
pub struct GemmxAccConfig {
    pub snax_gemmx_mesh_row: u64,
    pub snax_gemmx_tile_size: u64,
    pub snax_gemmx_mesh_col: u64,
    pub snax_gemmx_serial_c32_d32_width: u64,
    pub snax_gemmx_serial_d8_width: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GemmxTemplate {
    pub snax_acc_cfg: Vec<GemmxAccConfig>,
}

/// 2D convolution with requantized output on GeMMX.
#[derive(Clone, Debug, Deserialize)]
pub struct ConvConfig {
    #[serde(rename = "Nbatch")]
    pub nbatch: u64,
    #[serde(rename = "Cin")]
    pub cin: u64,
    #[serde(rename = "Cout")]
    pub cout: u64,
    #[serde(rename = "H")]
    pub h: u64,
    #[serde(rename = "W")]
    pub w: u64,
    #[serde(rename = "Kh")]
    pub kh: u64,
    #[serde(rename = "Kw")]
    pub kw: u64,
    pub stride_h: u64,
    pub stride_w: u64,
    pub pad_h: u64,
    pub pad_w: u64,
    #[serde(rename = "broadcast_C")]
    pub broadcast_c: u32,
    #[serde(rename = "channel_en_C")]
    pub channel_en_c: u32,
    pub interleaved_address: u32,
    /// Size of the shared scratchpad, in KiB.
    pub memory_size: u64,
    #[serde(rename = "bypassSIMD")]
    pub bypass_simd: u32,
    #[serde(rename = "snax_streamer_gemmX_core_template")]
    pub gemmx_core_template: GemmxTemplate,
}

impl ConvConfig {
    pub fn accelerator(&self) -> Result<&GemmxAccConfig> {
        self.gemmx_core_template.snax_acc_cfg.first().ok_or_else(|| {
            DatagenError::config(
                "snax_streamer_gemmX_core_template.snax_acc_cfg",
                "no accelerator is configured",
            )
        })
    }

    /// The convolution as configured, with `W` widened so that the output width fills whole row blocks.
    pub fn shape(&self) -> Result<ConvShape> {
        let acc = self.accelerator()?;
        let shape = ConvShape {
            nbatch: self.nbatch as usize,
            cin: self.cin as usize,
            h: self.h as usize,
            w: self.w as usize,
            cout: self.cout as usize,
            kh: self.kh as usize,
            kw: self.kw as usize,
            stride_h: self.stride_h as usize,
            stride_w: self.stride_w as usize,
            pad_h: self.pad_h as usize,
            pad_w: self.pad_w as usize,
            mesh_row: acc.snax_gemmx_mesh_row as usize,
            tile_size: acc.snax_gemmx_tile_size as usize,
            mesh_col: acc.snax_gemmx_mesh_col as usize,
        };
        // guard the width adjustment against a zero mesh or stride
        positive("snax_gemmx_mesh_row", acc.snax_gemmx_mesh_row)?;
        positive("stride_w", self.stride_w)?;
        Ok(shape.with_adjusted_width())
    }

    pub fn bias_mode(&self) -> Result<BiasMode> {
        BiasMode::from_flags(
            flag("broadcast_C", self.broadcast_c)?,
            flag("channel_en_C", self.channel_en_c)?,
        )
    }

    pub fn interleaved(&self) -> Result<bool> {
        flag("interleaved_address", self.interleaved_address)
    }

    pub fn validate(&self) -> Result<()> {
        let shape = self.shape()?;
        shape.validate()?;
        // the A streamer has no batch loop
        if self.nbatch != 1 {
            return Err(DatagenError::config(
                "Nbatch",
                format!("{} batches were requested but only 1 is supported", self.nbatch),
            ));
        }
        self.bias_mode()?;
        self.interleaved()?;
        flag("bypassSIMD", self.bypass_simd)?;
        positive("memory_size", self.memory_size)?;
        let acc = self.accelerator()?;
        positive(
            "snax_gemmx_serial_c32_d32_width",
            acc.snax_gemmx_serial_c32_d32_width,
        )?;
        positive("snax_gemmx_serial_d8_width", acc.snax_gemmx_serial_d8_width)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::parse;

    use super::ConvConfig;

    fn conv_json(w: u64, nbatch: u64) -> serde_json::Value {
        json!({
            "Nbatch": nbatch, "Cin": 8, "Cout": 8, "H": 4, "W": w, "Kh": 3, "Kw": 3,
            "stride_h": 1, "stride_w": 1, "pad_h": 1, "pad_w": 1,
            "broadcast_C": 0, "channel_en_C": 1, "interleaved_address": 1,
            "memory_size": 128, "bypassSIMD": 0,
            "snax_streamer_gemmX_core_template": {"snax_acc_cfg": [{
                "snax_gemmx_mesh_row": 8, "snax_gemmx_tile_size": 8, "snax_gemmx_mesh_col": 8,
                "snax_gemmx_serial_c32_d32_width": 512, "snax_gemmx_serial_d8_width": 512
            }]}
        })
    }

    #[test]
    fn width_is_adjusted_to_the_mesh() {
        let cfg: ConvConfig = parse("conv", conv_json(6, 1).as_object().unwrap()).unwrap();
        cfg.validate().unwrap();
        let shape = cfg.shape().unwrap();
        assert_eq!(shape.w, 8);
        assert_eq!(shape.out_width().unwrap(), 8);
    }

    #[test]
    fn batches_are_rejected() {
        let cfg: ConvConfig = parse("conv", conv_json(8, 2).as_object().unwrap()).unwrap();
        assert!(cfg.validate().is_err());
    }
}
