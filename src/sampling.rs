//! Picks the output indices that the on-device test checks.
//! Checking every element of a large output is too slow in simulation, so only a handful are compared.

use serde::{Deserialize, Serialize};

use crate::{
    error::{DatagenError, Result},
    logging::{
        events::{SamplesSelected, UnseededSampling},
        log_event, log_event_cb,
    },
};

pub const DEFAULT_SEED: u64 = 42;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// Reproducible: the same configuration always yields the same indices.
    Seeded(u64),
    /// Draw from an entropy-seeded generator. Every run checks different elements.
    Unseeded,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        SamplingPolicy::Seeded(DEFAULT_SEED)
    }
}

pub struct SampleSelector {
    policy: SamplingPolicy,
    rng: fastrand::Rng,
    count: usize,
}

impl SampleSelector {
    pub fn new(policy: SamplingPolicy, count: usize) -> Self {
        let rng = match policy {
            SamplingPolicy::Seeded(seed) => fastrand::Rng::with_seed(seed),
            SamplingPolicy::Unseeded => fastrand::Rng::new(),
        };
        Self { policy, rng, count }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Draws `count` indices in `[0, tensor_size)`, with replacement.
    pub fn select(&mut self, tensor: &str, tensor_size: u64) -> Result<Vec<u64>> {
        if tensor_size == 0 {
            return Err(DatagenError::config(
                tensor,
                "cannot sample from an empty tensor",
            ));
        }
        if self.policy == SamplingPolicy::Unseeded {
            log_event(&UnseededSampling {
                tensor: tensor.to_string(),
            })?;
        }
        let indices: Vec<u64> = (0..self.count)
            .map(|_| self.rng.u64(0..tensor_size))
            .collect();
        log_event_cb(|| SamplesSelected {
            tensor: tensor.to_string(),
            tensor_size: tensor_size as usize,
            count: indices.len(),
        })?;
        Ok(indices)
    }
}

#[cfg(test)]
mod tests {
    use super::{SampleSelector, SamplingPolicy};

    #[test]
    fn seeded_selection_is_reproducible() {
        let mut first = SampleSelector::new(SamplingPolicy::Seeded(7), 25);
        let mut second = SampleSelector::new(SamplingPolicy::Seeded(7), 25);
        let a = first.select("D", 1000).unwrap();
        assert_eq!(a, second.select("D", 1000).unwrap());
        assert_eq!(a.len(), 25);
        assert!(a.iter().all(|i| *i < 1000));
    }

    #[test]
    fn indices_stay_in_range() {
        let mut selector = SampleSelector::new(SamplingPolicy::Unseeded, 100);
        let picked = selector.select("y", 3).unwrap();
        assert!(picked.iter().all(|i| *i < 3));
    }

    #[test]
    fn samples_may_repeat_when_the_tensor_is_small() {
        let mut selector = SampleSelector::new(SamplingPolicy::default(), 10);
        let picked = selector.select("y", 3).unwrap();
        // ten draws from three indices keep every draw
        assert_eq!(picked.len(), 10);
        let mut distinct = picked.clone();
        distinct.sort_unstable();
        distinct.dedup();
        assert!(distinct.len() < picked.len());
    }

    #[test]
    fn empty_tensors_cannot_be_sampled() {
        let mut selector = SampleSelector::new(SamplingPolicy::default(), 1);
        assert!(selector.select("z", 0).is_err());
    }
}
