//! Bit-exact model of the requantization stage behind the 32-bit accumulators.
//!
//! The datapath subtracts the input zero-point, multiplies by a 32-bit multiplier, adds a rounding bias, shifts right,
//! narrows to 32 bits, adds the output zero-point and clips. All intermediates here are `i128`, which is exact for
//! every legal input (32-bit operands, shift ≤ 63), so nothing before the narrowing step can overflow.

mod per_channel;

pub use per_channel::{bitpack_shifts, ChannelQuantization};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::{
    error::{DatagenError, Result},
    logging::{events::ZeroShiftApplied, log_event_cb},
};

/// Largest shift the hardware accepts.
pub const MAX_SHIFT: u8 = 63;

/// What to do with the rounding bias when the shift is zero, where `1 << (shift - 1)` is undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroShiftPolicy {
    /// Nothing to round away: the bias is 0.
    #[default]
    NoBias,
    /// Refuse to model it.
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned")]
pub struct QuantizationParams {
    #[builder(default)]
    pub input_zp: i32,

    #[builder(default)]
    pub output_zp: i32,

    pub multiplier: i32,

    pub shift: u8,

    #[builder(default = "i8::MIN as i32")]
    pub min_int: i32,

    #[builder(default = "i8::MAX as i32")]
    pub max_int: i32,

    #[builder(default)]
    pub double_round: bool,
}

impl QuantizationParams {
    pub fn validate(&self) -> Result<()> {
        if self.shift > MAX_SHIFT {
            return Err(DatagenError::config(
                "shift",
                format!("{} is outside [0, {MAX_SHIFT}]", self.shift),
            ));
        }
        if self.min_int > self.max_int {
            return Err(DatagenError::config(
                "min_int/max_int",
                format!("min_int {} exceeds max_int {}", self.min_int, self.max_int),
            ));
        }
        Ok(())
    }
}

/// Every intermediate value of one rescale, in pipeline order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RescaleTrace {
    pub v1: i128,
    pub v2: i128,
    pub bias: i128,
    pub v3: i128,
    pub v4: i32,
    pub v5: i32,
    pub result: i32,
}

fn rounding_bias(v1: i128, params: &QuantizationParams, policy: ZeroShiftPolicy) -> Result<i128> {
    if params.shift == 0 {
        return match policy {
            ZeroShiftPolicy::NoBias => {
                log_event_cb(|| ZeroShiftApplied {
                    policy: format!("{policy:?}"),
                })?;
                Ok(0)
            }
            ZeroShiftPolicy::Reject => Err(DatagenError::config(
                "shift",
                "a shift of 0 has no defined rounding bias",
            )),
        };
    }
    let mut bias = 1i128 << (params.shift - 1);
    if params.double_round && params.shift > 31 {
        let correction = 1i128 << 30;
        bias += if v1 >= 0 { correction } else { -correction };
    }
    Ok(bias)
}

pub fn rescale_traced(
    data_in: i32,
    params: &QuantizationParams,
    policy: ZeroShiftPolicy,
) -> Result<RescaleTrace> {
    params.validate()?;
    let v1 = data_in as i128 - params.input_zp as i128;
    let v2 = v1 * params.multiplier as i128;
    let bias = rounding_bias(v1, params, policy)?;
    let v3 = v2 + bias;
    // the 32-bit datapath keeps only the low word
    let v4 = (v3 >> params.shift) as i32;
    let v5 = v4.wrapping_add(params.output_zp);
    let result = v5.clamp(params.min_int, params.max_int);
    Ok(RescaleTrace {
        v1,
        v2,
        bias,
        v3,
        v4,
        v5,
        result,
    })
}

/// Requantizes one accumulator value.
pub fn rescale(data_in: i32, params: &QuantizationParams, policy: ZeroShiftPolicy) -> Result<i32> {
    Ok(rescale_traced(data_in, params, policy)?.result)
}
