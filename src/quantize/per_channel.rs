use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};

use super::{rescale, QuantizationParams, ZeroShiftPolicy};

/// Requantization with one shift and multiplier per output channel.
/// Zero-points, clip bounds and double rounding are shared by every channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelQuantization {
    pub input_zp: i32,
    pub output_zp: i32,
    pub min_int: i32,
    pub max_int: i32,
    pub double_round: bool,
    pub shifts: Vec<u8>,
    pub multipliers: Vec<i32>,
}

impl ChannelQuantization {
    pub fn group_count(&self) -> usize {
        self.shifts.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.shifts.is_empty() || self.shifts.len() != self.multipliers.len() {
            return Err(DatagenError::config(
                "shared_multiplier",
                format!(
                    "{} shifts and {} multipliers were given",
                    self.shifts.len(),
                    self.multipliers.len()
                ),
            ));
        }
        (0..self.group_count()).try_for_each(|group| self.params(group).validate())
    }

    /// Scalar parameters of channel `group`.
    pub fn params(&self, group: usize) -> QuantizationParams {
        QuantizationParams {
            input_zp: self.input_zp,
            output_zp: self.output_zp,
            multiplier: self.multipliers[group],
            shift: self.shifts[group],
            min_int: self.min_int,
            max_int: self.max_int,
            double_round: self.double_round,
        }
    }

    /// Requantizes a tensor whose innermost dimension is the output channel: element `i` uses group `i % groups`.
    pub fn requantize(&self, data: &[i32], policy: ZeroShiftPolicy) -> Result<Vec<i32>> {
        self.validate()?;
        let groups: Vec<_> = (0..self.group_count()).map(|g| self.params(g)).collect();
        data.iter()
            .enumerate()
            .map(|(i, x)| rescale(*x, &groups[i % groups.len()], policy))
            .collect()
    }

    pub fn bitpacked_shifts(&self) -> Vec<u32> {
        bitpack_shifts(&self.shifts)
    }
}

/// Packs four shifts per 32-bit word, byte `j` of word `w` holding shift `4w + j`.
/// A trailing partial word is zero-filled.
pub fn bitpack_shifts(shifts: &[u8]) -> Vec<u32> {
    shifts
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u32, |word, (j, shift)| word | (*shift as u32) << (8 * j))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::quantize::ZeroShiftPolicy;

    use super::{bitpack_shifts, ChannelQuantization};

    fn quantization() -> ChannelQuantization {
        ChannelQuantization {
            input_zp: 0,
            output_zp: 0,
            min_int: -128,
            max_int: 127,
            double_round: false,
            shifts: vec![1, 2],
            multipliers: vec![1, 1],
        }
    }

    #[test]
    fn channels_cycle_through_groups() {
        let quant = quantization();
        let out = quant
            .requantize(&[8, 8, 9, 9, 1000, -1000], ZeroShiftPolicy::NoBias)
            .unwrap();
        assert_eq!(out, vec![4, 2, 5, 2, 127, -128]);
    }

    #[test]
    fn mismatched_groups_are_rejected() {
        let mut quant = quantization();
        quant.multipliers.pop();
        assert!(quant.requantize(&[1], ZeroShiftPolicy::NoBias).is_err());
    }

    #[test]
    fn shifts_pack_little_endian() {
        assert_eq!(
            bitpack_shifts(&[1, 2, 3, 4, 63]),
            vec![0x04030201, 0x0000003f]
        );
    }
}
