pub mod tensor;

use serde::{Deserialize, Serialize};

pub use tensor::TensorSpec;

/// Width of an FP8 element in bits.
pub const FP8: u64 = 8;
/// Width of a BF16 element in bits.
pub const BF16: u64 = 16;

/// C integer types that may appear in an emitted header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CType {
    #[serde(rename = "int8_t")]
    Int8,
    #[serde(rename = "uint8_t")]
    UInt8,
    #[serde(rename = "int16_t")]
    Int16,
    #[serde(rename = "uint16_t")]
    UInt16,
    #[serde(rename = "int32_t")]
    Int32,
    #[serde(rename = "uint32_t")]
    UInt32,
    #[serde(rename = "int")]
    Int,
}

impl CType {
    pub fn name(&self) -> &'static str {
        match self {
            CType::Int8 => "int8_t",
            CType::UInt8 => "uint8_t",
            CType::Int16 => "int16_t",
            CType::UInt16 => "uint16_t",
            CType::Int32 => "int32_t",
            CType::UInt32 => "uint32_t",
            CType::Int => "int",
        }
    }

    /// Size of the type in BITS
    pub fn bits(&self) -> u64 {
        match self {
            CType::Int8 | CType::UInt8 => 8,
            CType::Int16 | CType::UInt16 => 16,
            CType::Int32 | CType::UInt32 | CType::Int => 32,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, CType::Int8 | CType::Int16 | CType::Int32 | CType::Int)
    }

    /// Inclusive range of values representable by the type.
    pub fn range(&self) -> (i64, i64) {
        let bits = self.bits();
        if self.is_signed() {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        }
    }

    pub fn fits(&self, value: i64) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&value)
    }
}

impl std::fmt::Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Native integer types with a fixed bit width and a C counterpart.
pub trait StaticallySized: num::PrimInt + Default + core::fmt::Debug + Into<i64> {
    // Size of the type in BITS
    const SIZE: usize;
    const CTYPE: CType;
}

macro_rules! statically_sized {
    ($($ty: ty => $ctype: expr),* $(,)?) => {
        $(
            impl StaticallySized for $ty {
                const SIZE: usize = <$ty>::BITS as usize;
                const CTYPE: CType = $ctype;
            }
        )*
    };
}

statically_sized!(
    i8 => CType::Int8,
    u8 => CType::UInt8,
    i16 => CType::Int16,
    u16 => CType::UInt16,
    i32 => CType::Int32,
    u32 => CType::UInt32,
);

#[cfg(test)]
mod tests {
    use super::{CType, StaticallySized};

    #[test]
    fn sizes_match_c_types() {
        assert_eq!(i8::SIZE as u64, i8::CTYPE.bits());
        assert_eq!(u16::SIZE as u64, u16::CTYPE.bits());
        assert_eq!(i32::SIZE as u64, i32::CTYPE.bits());
        assert_eq!(i32::CTYPE.to_string(), "int32_t");
    }

    #[test]
    fn ranges() {
        assert_eq!(CType::Int8.range(), (-128, 127));
        assert_eq!(CType::UInt32.range(), (0, u32::MAX as i64));
        assert!(CType::UInt16.fits(65535));
        assert!(!CType::UInt16.fits(-1));
        assert!(!CType::Int.fits(1 << 31));
    }

    #[test]
    fn c_types_deserialize_from_their_names() {
        let parsed: CType = serde_json::from_str("\"uint16_t\"").unwrap();
        assert_eq!(parsed, CType::UInt16);
    }
}
