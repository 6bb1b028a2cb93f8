use serde::{Deserialize, Serialize};

use crate::{
    error::{DatagenError, Result},
    logging::{events::DescriptorSynthesized, log_event_cb},
};

use super::ChannelEnableMask;

/// One temporal loop level: how many iterations and how many bytes each iteration advances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loop {
    pub bound: u64,
    pub stride: i64,
}

/// A tensor access expressed as loops, innermost first.
/// This is what workloads write down; it is not yet validated or padded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopNest {
    loops: Vec<Loop>,
    spatial_stride: Option<i64>,
}

impl LoopNest {
    pub fn new(pairs: impl IntoIterator<Item = (u64, i64)>) -> Self {
        Self {
            loops: pairs
                .into_iter()
                .map(|(bound, stride)| Loop { bound, stride })
                .collect(),
            spatial_stride: None,
        }
    }

    /// Builds a nest from parallel bound and stride lists.
    pub fn from_lists(bounds: &[u64], strides: &[i64]) -> Result<Self> {
        if bounds.len() != strides.len() {
            return Err(DatagenError::config(
                "temporal bounds/strides",
                format!(
                    "{} bounds were given for {} strides",
                    bounds.len(),
                    strides.len()
                ),
            ));
        }
        Ok(Self::new(bounds.iter().copied().zip(strides.iter().copied())))
    }

    /// Overrides the default spatial stride (one bank).
    pub fn with_spatial_stride(mut self, stride: i64) -> Self {
        self.spatial_stride = Some(stride);
        self
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn depth(&self) -> usize {
        self.loops.len()
    }

    pub fn spatial_stride(&self) -> Option<i64> {
        self.spatial_stride
    }

    /// Total number of temporal iterations.
    pub fn element_count(&self) -> u64 {
        self.loops.iter().map(|l| l.bound).product()
    }

    /// Fails fast when the loop bounds don't cover exactly `expected` elements.
    pub fn expect_elements(&self, what: &str, expected: u64) -> Result<()> {
        let actual = self.element_count();
        if actual != expected {
            return Err(DatagenError::ShapeMismatch {
                what: what.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// A validated, fixed-depth streamer program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamerDescriptor {
    bounds: Vec<u64>,
    strides: Vec<i64>,
    spatial_stride: i64,
    channel_enable: Option<ChannelEnableMask>,
}

/// Turns a [LoopNest] into a [StreamerDescriptor] with exactly `depth` loops.
/// Unused outer loops get bound 1 and stride 0. Every supplied stride (and the spatial stride) must be a multiple of
/// `bank_bytes`; anything else is a configuration bug and is reported as an alignment error.
pub fn synthesize(
    what: &str,
    nest: &LoopNest,
    depth: usize,
    bank_bytes: u64,
) -> Result<StreamerDescriptor> {
    if nest.depth() > depth {
        return Err(DatagenError::config(
            what,
            format!(
                "{} loops were supplied but the port only has {depth}",
                nest.depth()
            ),
        ));
    }
    if let Some(pos) = nest.loops.iter().position(|l| l.bound == 0) {
        return Err(DatagenError::config(
            what,
            format!("loop {pos} has a bound of 0"),
        ));
    }

    let granularity = bank_bytes as i64;
    for (level, l) in nest.loops.iter().enumerate() {
        if l.stride % granularity != 0 {
            return Err(DatagenError::Alignment {
                what: format!("{what} temporal stride {level}"),
                value: l.stride,
                granularity: bank_bytes,
            });
        }
    }
    let spatial_stride = nest.spatial_stride.unwrap_or(granularity);
    if spatial_stride % granularity != 0 {
        return Err(DatagenError::Alignment {
            what: format!("{what} spatial stride"),
            value: spatial_stride,
            granularity: bank_bytes,
        });
    }

    let mut bounds: Vec<u64> = nest.loops.iter().map(|l| l.bound).collect();
    let mut strides: Vec<i64> = nest.loops.iter().map(|l| l.stride).collect();
    bounds.resize(depth, 1);
    strides.resize(depth, 0);

    log_event_cb(|| DescriptorSynthesized {
        port: what.to_string(),
        bounds: bounds.clone(),
        strides: strides.clone(),
        spatial_stride,
    })?;

    Ok(StreamerDescriptor {
        bounds,
        strides,
        spatial_stride,
        channel_enable: None,
    })
}

impl StreamerDescriptor {
    pub fn with_channel_enable(mut self, mask: ChannelEnableMask) -> Self {
        self.channel_enable = Some(mask);
        self
    }

    pub fn bounds(&self) -> &[u64] {
        &self.bounds
    }

    pub fn strides(&self) -> &[i64] {
        &self.strides
    }

    pub fn spatial_stride(&self) -> i64 {
        self.spatial_stride
    }

    pub fn channel_enable(&self) -> Option<&ChannelEnableMask> {
        self.channel_enable.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.bounds.len()
    }

    pub fn element_count(&self) -> u64 {
        self.bounds.iter().product()
    }

    /// Walks the temporal loops inner to outer, yielding `base + Σ index_i·stride_i` per iteration.
    pub fn addresses(&self, base: i64) -> AddressWalk<'_> {
        AddressWalk {
            descriptor: self,
            base,
            index: vec![0; self.depth()],
            done: self.element_count() == 0,
        }
    }

    /// Like [StreamerDescriptor::addresses], but every temporal step also fans out over `lanes` parallel memory
    /// ports spaced by the spatial stride.
    pub fn addresses_with_spatial(&self, base: i64, lanes: u64) -> impl Iterator<Item = i64> + '_ {
        let spatial = self.spatial_stride;
        self.addresses(base)
            .flat_map(move |addr| (0..lanes as i64).map(move |lane| addr + lane * spatial))
    }
}

/// Iterator over the addresses visited by a descriptor.
pub struct AddressWalk<'a> {
    descriptor: &'a StreamerDescriptor,
    base: i64,
    index: Vec<u64>,
    done: bool,
}

impl Iterator for AddressWalk<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let addr = self.base
            + self
                .index
                .iter()
                .zip(self.descriptor.strides.iter())
                .map(|(i, s)| *i as i64 * s)
                .sum::<i64>();

        // odometer increment, innermost first
        let mut level = 0;
        loop {
            if level == self.index.len() {
                self.done = true;
                break;
            }
            self.index[level] += 1;
            if self.index[level] < self.descriptor.bounds[level] {
                break;
            }
            self.index[level] = 0;
            level += 1;
        }
        Some(addr)
    }
}
