//! Logical tensor declarations.

use serde::{Deserialize, Serialize};

/// A named tensor with a fixed element width and logical shape.
/// Immutable once declared; the byte length is derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSpec {
    name: String,
    element_bits: u64,
    shape: Vec<u64>,
}

impl TensorSpec {
    pub fn new(name: impl Into<String>, element_bits: u64, shape: &[u64]) -> Self {
        Self {
            name: name.into(),
            element_bits,
            shape: shape.to_vec(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn element_bits(&self) -> u64 {
        self.element_bits
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn element_count(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Number of bytes occupied, rounding a trailing partial byte up.
    pub fn byte_length(&self) -> u64 {
        (self.element_count() * self.element_bits).div_ceil(8)
    }

    /// Number of `width_bits`-wide transfers needed to move the whole tensor.
    pub fn transfers(&self, width_bits: u64) -> u64 {
        (self.element_count() * self.element_bits).div_ceil(width_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::TensorSpec;

    #[test]
    fn derived_lengths() {
        let spec = TensorSpec::new("A", 8, &[2, 3, 8, 8]);
        assert_eq!(spec.element_count(), 384);
        assert_eq!(spec.byte_length(), 384);
        assert_eq!(spec.transfers(64), 48);

        let bf16 = TensorSpec::new("iscore_out", 16, &[64, 32]);
        assert_eq!(bf16.byte_length(), 4096);
    }

    #[test]
    fn partial_bytes_round_up() {
        let bits = TensorSpec::new("mask", 1, &[9]);
        assert_eq!(bits.byte_length(), 2);
    }
}
