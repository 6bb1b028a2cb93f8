use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{DatagenError, Result};

/// How the bias operand C is fed to the array, selected by the `(broadcast_C, channel_en_C)` flag pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BiasMode {
    /// One row of `meshCol` values per output block, repeated over the `meshRow` rows.
    Broadcast,
    /// An independent value for every output element.
    Full,
    /// No bias; C reads as zeros.
    Disabled,
}

impl BiasMode {
    pub fn from_flags(broadcast_c: bool, channel_en_c: bool) -> Result<Self> {
        match (broadcast_c, channel_en_c) {
            (true, true) => Ok(BiasMode::Broadcast),
            (false, true) => Ok(BiasMode::Full),
            (false, false) => Ok(BiasMode::Disabled),
            (true, false) => Err(DatagenError::config(
                "broadcast_C/channel_en_C",
                "a broadcast bias needs its channels enabled",
            )),
        }
    }

    pub fn broadcast_flag(&self) -> bool {
        matches!(self, BiasMode::Broadcast)
    }

    /// Random bias for `blocks` output blocks of `mesh_row × mesh_col`, block-major.
    pub fn generate(
        &self,
        rng: &mut fastrand::Rng,
        blocks: usize,
        mesh_row: usize,
        mesh_col: usize,
        range: Range<i32>,
    ) -> Vec<i32> {
        let len = blocks * mesh_row * mesh_col;
        match self {
            BiasMode::Full => (0..len).map(|_| rng.i32(range.clone())).collect(),
            BiasMode::Broadcast => {
                let mut out = Vec::with_capacity(len);
                for _ in 0..blocks {
                    let row: Vec<i32> = (0..mesh_col).map(|_| rng.i32(range.clone())).collect();
                    for _ in 0..mesh_row {
                        out.extend_from_slice(&row);
                    }
                }
                out
            }
            BiasMode::Disabled => vec![0; len],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BiasMode;

    #[test]
    fn flag_combinations() {
        assert_eq!(BiasMode::from_flags(true, true).unwrap(), BiasMode::Broadcast);
        assert_eq!(BiasMode::from_flags(false, true).unwrap(), BiasMode::Full);
        assert_eq!(BiasMode::from_flags(false, false).unwrap(), BiasMode::Disabled);
        assert!(BiasMode::from_flags(true, false).is_err());
    }

    #[test]
    fn broadcast_repeats_rows() {
        let mut rng = fastrand::Rng::with_seed(1);
        let bias = BiasMode::Broadcast.generate(&mut rng, 2, 3, 4, -128..127);
        assert_eq!(bias.len(), 24);
        for block in bias.chunks(12) {
            assert_eq!(block[0..4], block[4..8]);
            assert_eq!(block[0..4], block[8..12]);
        }
        let zeros = BiasMode::Disabled.generate(&mut rng, 2, 3, 4, -128..127);
        assert!(zeros.iter().all(|v| *v == 0));
    }
}
