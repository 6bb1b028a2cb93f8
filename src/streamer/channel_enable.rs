use serde::{Deserialize, Serialize};

/// How finely the channels of a port can be switched on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelGranularity {
    /// The port hangs on the wide interconnect: eight narrow channels make up one wide channel, so enables come in
    /// groups of eight.
    Wide,
    /// Every narrow channel can be enabled on its own.
    Narrow,
}

/// Per-channel enable bits of a streamer, in CSR order (most significant word first).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnableMask {
    words: Vec<u32>,
}

impl ChannelEnableMask {
    /// Number of 32-bit CSR words needed for a port of `port_width` bits on banks of `bank_width` bits.
    pub fn word_count(port_width: u64, bank_width: u64) -> usize {
        port_width.div_ceil(bank_width).div_ceil(32) as usize
    }

    /// Rounds a requested channel count to what the hardware can actually enable.
    /// Requesting nothing yields nothing, otherwise at least 8 channels are enabled.
    pub fn enabled_bits(requested: u64, granularity: ChannelGranularity) -> u64 {
        if requested == 0 {
            return 0;
        }
        let rounded = match granularity {
            ChannelGranularity::Wide => requested.next_multiple_of(8),
            ChannelGranularity::Narrow => requested,
        };
        rounded.max(8)
    }

    /// Sets the `bits` least-significant channel bits of a `words`-word mask.
    /// Bits that do not fit the mask are dropped.
    pub fn from_bits(words: usize, bits: u64) -> Self {
        let mut lsw_first = vec![0u32; words];
        for i in 0..bits {
            let word = (i / 32) as usize;
            if word >= words {
                break;
            }
            lsw_first[word] |= 1 << (i % 32);
        }
        lsw_first.reverse();
        Self { words: lsw_first }
    }

    /// Mask for a port of `port_width` bits with `requested` channels switched on.
    pub fn with_enabled(
        port_width: u64,
        bank_width: u64,
        requested: u64,
        granularity: ChannelGranularity,
    ) -> Self {
        Self::from_bits(
            Self::word_count(port_width, bank_width),
            Self::enabled_bits(requested, granularity),
        )
    }

    pub fn full(words: usize) -> Self {
        Self {
            words: vec![u32::MAX; words],
        }
    }

    pub fn disabled(words: usize) -> Self {
        Self {
            words: vec![0; words],
        }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelEnableMask, ChannelGranularity};

    #[test]
    fn word_counts() {
        // 8x8 int32 output through 64-bit banks: 32 channels, one word
        assert_eq!(ChannelEnableMask::word_count(8 * 8 * 32, 64), 1);
        assert_eq!(ChannelEnableMask::word_count(4096, 64), 2);
        assert_eq!(ChannelEnableMask::word_count(64, 64), 1);
    }

    #[test]
    fn wide_channels_round_to_eight() {
        assert_eq!(
            ChannelEnableMask::enabled_bits(4, ChannelGranularity::Wide),
            8
        );
        assert_eq!(
            ChannelEnableMask::enabled_bits(9, ChannelGranularity::Wide),
            16
        );
        assert_eq!(
            ChannelEnableMask::enabled_bits(9, ChannelGranularity::Narrow),
            9
        );
        assert_eq!(
            ChannelEnableMask::enabled_bits(3, ChannelGranularity::Narrow),
            8
        );
        assert_eq!(
            ChannelEnableMask::enabled_bits(0, ChannelGranularity::Wide),
            0
        );
    }

    #[test]
    fn words_are_reversed() {
        let mask = ChannelEnableMask::from_bits(2, 40);
        assert_eq!(mask.words(), &[0xff, u32::MAX]);
        assert_eq!(mask.count_ones(), 40);
    }

    #[test]
    fn overflowing_bits_are_dropped() {
        let mask = ChannelEnableMask::from_bits(1, 48);
        assert_eq!(mask.words(), &[u32::MAX]);
    }

    #[test]
    fn zero_request_is_all_zero() {
        let mask = ChannelEnableMask::with_enabled(2048, 64, 0, ChannelGranularity::Wide);
        assert_eq!(mask, ChannelEnableMask::disabled(1));
    }
}
