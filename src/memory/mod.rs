//! Address allocation for the tensors of one test case.
//!
//! Tensors are requested in order, either as a fresh region of some length or as an alias of an earlier region
//! (e.g. an output written in place over its bias). The [Allocator] assigns byte offsets according to its
//! [AllocationPolicy] and returns an immutable [AddressLayout].

mod layout;

pub use layout::{AddressLayout, Region};

use crate::{
    error::{DatagenError, Result},
    logging::{events::RegionAllocated, log_event_cb},
};

/// Default alignment of every region start, in bytes.
pub const WIDE_ALIGNMENT: u64 = 64;

/// Distance between the physical bases of two separate regions, in bytes.
pub const PHYSICAL_REGION_DELTA: u64 = 64;

/// Rounds `addr` up to the next multiple of `alignment`.
pub fn align_wide_addr(addr: u64, alignment: u64) -> u64 {
    addr.div_ceil(alignment) * alignment
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationPolicy {
    /// Pack all regions back to back in one arena. The total span is checked against `capacity` when given.
    Interleaved { capacity: Option<u64> },

    /// Give region `i` its own reservation at `base + i * region_size`, independent of its actual length.
    /// The address remapper then spreads every reservation over its own banks.
    Separate { region_size: u64, capacity: u64 },
}

impl AllocationPolicy {
    /// Index written into the streamer address-remap CSR.
    pub fn remap_index(&self) -> u32 {
        match self {
            AllocationPolicy::Interleaved { .. } => 0,
            AllocationPolicy::Separate { .. } => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Request {
    Region { name: String, length: u64 },
    Alias { name: String, of: String },
}

#[derive(Clone, Debug)]
pub struct Allocator {
    policy: AllocationPolicy,
    base: u64,
    alignment: u64,
    requests: Vec<Request>,
}

impl Allocator {
    pub fn new(policy: AllocationPolicy) -> Self {
        Self {
            policy,
            base: 0,
            alignment: WIDE_ALIGNMENT,
            requests: vec![],
        }
    }

    pub fn interleaved() -> Self {
        Self::new(AllocationPolicy::Interleaved { capacity: None })
    }

    /// Sets the first address. An unaligned base is rounded up to the alignment.
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    pub fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn region(mut self, name: impl Into<String>, length: u64) -> Self {
        self.requests.push(Request::Region {
            name: name.into(),
            length,
        });
        self
    }

    /// Places `name` at the same address as the earlier region `of`.
    pub fn alias(mut self, name: impl Into<String>, of: impl Into<String>) -> Self {
        self.requests.push(Request::Alias {
            name: name.into(),
            of: of.into(),
        });
        self
    }

    pub fn allocate(self) -> Result<AddressLayout> {
        if self.alignment == 0 {
            return Err(DatagenError::config("alignment", "must be non-zero"));
        }
        let base = align_wide_addr(self.base, self.alignment);
        let mut layout = AddressLayout::new(self.policy.remap_index());
        let mut cursor = base;
        let mut slot = 0u64;

        for request in self.requests {
            let region = match request {
                Request::Region { name, length } => {
                    let (offset, physical_offset) = match self.policy {
                        AllocationPolicy::Interleaved { .. } => {
                            let offset = cursor;
                            cursor = align_wide_addr(offset + length, self.alignment);
                            (offset, offset)
                        }
                        AllocationPolicy::Separate { region_size, .. } => {
                            if length >= region_size {
                                return Err(DatagenError::CapacityExceeded {
                                    requested: length,
                                    available: region_size,
                                });
                            }
                            let placed = (
                                base + slot * region_size,
                                slot * PHYSICAL_REGION_DELTA,
                            );
                            slot += 1;
                            placed
                        }
                    };
                    Region {
                        name,
                        offset,
                        length,
                        physical_offset,
                        alias_of: None,
                    }
                }
                Request::Alias { name, of } => {
                    let target = layout.region(&of)?;
                    Region {
                        name,
                        offset: target.offset,
                        length: target.length,
                        physical_offset: target.physical_offset,
                        alias_of: Some(of),
                    }
                }
            };

            log_event_cb(|| RegionAllocated {
                name: region.name.clone(),
                offset: region.offset,
                length: region.length,
                alias_of: region.alias_of.clone(),
            })?;
            layout.insert(region)?;
        }

        match self.policy {
            AllocationPolicy::Interleaved {
                capacity: Some(capacity),
            } => {
                let used = layout.end().saturating_sub(base);
                if used > capacity {
                    return Err(DatagenError::CapacityExceeded {
                        requested: used,
                        available: capacity,
                    });
                }
            }
            AllocationPolicy::Interleaved { capacity: None } => {}
            AllocationPolicy::Separate {
                region_size,
                capacity,
            } => {
                if region_size % self.alignment != 0 {
                    return Err(DatagenError::Alignment {
                        what: "separate region size".to_string(),
                        value: region_size as i64,
                        granularity: self.alignment,
                    });
                }
                let reserved = slot * region_size;
                if reserved > capacity {
                    return Err(DatagenError::CapacityExceeded {
                        requested: reserved,
                        available: capacity,
                    });
                }
            }
        }
        Ok(layout)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::DatagenError;

    use super::{align_wide_addr, AllocationPolicy, Allocator};

    #[test]
    fn alignment_rounds_up() {
        assert_eq!(align_wide_addr(0, 64), 0);
        assert_eq!(align_wide_addr(1, 64), 64);
        assert_eq!(align_wide_addr(128, 64), 128);
        assert_eq!(align_wide_addr(129, 8), 136);
    }

    #[test]
    fn interleaved_packs_sequentially() {
        let layout = Allocator::interleaved()
            .region("a", 100)
            .region("b", 64)
            .region("c", 1)
            .allocate()
            .unwrap();
        assert_eq!(layout.offset("a").unwrap(), 0);
        assert_eq!(layout.offset("b").unwrap(), 128);
        assert_eq!(layout.offset("c").unwrap(), 192);
        assert_eq!(layout.length("a").unwrap(), 100);
        assert_eq!(layout.remap_index(), 0);
    }

    #[test]
    fn unaligned_base_is_rounded_up() {
        let layout = Allocator::interleaved()
            .with_base(13)
            .region("a", 10)
            .region("b", 10)
            .allocate()
            .unwrap();
        assert_eq!(layout.offset("a").unwrap(), 64);
        assert_eq!(layout.offset("b").unwrap(), 128);

        let layout = Allocator::new(AllocationPolicy::Separate {
            region_size: 1024,
            capacity: 4096,
        })
        .with_base(100)
        .region("a", 8)
        .region("b", 8)
        .allocate()
        .unwrap();
        assert_eq!(layout.offset("a").unwrap(), 128);
        assert_eq!(layout.offset("b").unwrap(), 1152);
    }

    #[test]
    fn aliases_share_their_target() {
        let layout = Allocator::interleaved()
            .region("c", 256)
            .alias("d", "c")
            .region("e", 8)
            .allocate()
            .unwrap();
        assert_eq!(layout.offset("d").unwrap(), layout.offset("c").unwrap());
        assert_eq!(layout.offset("e").unwrap(), 256);
        assert!(matches!(
            Allocator::interleaved().alias("d", "missing").allocate(),
            Err(DatagenError::Config { .. })
        ));
    }

    #[test]
    fn interleaved_capacity_is_enforced() {
        let result = Allocator::new(AllocationPolicy::Interleaved {
            capacity: Some(128),
        })
        .region("a", 100)
        .region("b", 64)
        .allocate();
        match result {
            Err(DatagenError::CapacityExceeded {
                requested,
                available,
            }) => assert_eq!((requested, available), (192, 128)),
            other => panic!("Expected a capacity error, got {other:?}"),
        }
    }

    #[test]
    fn separate_regions_are_fixed_apart() {
        let layout = Allocator::new(AllocationPolicy::Separate {
            region_size: 32 * 1024,
            capacity: 128 * 1024,
        })
        .region("a", 1000)
        .region("b", 2000)
        .region("c", 4096)
        .region("d32", 4096)
        .alias("d8", "d32")
        .allocate()
        .unwrap();
        assert_eq!(layout.offset("b").unwrap(), 32 * 1024);
        assert_eq!(layout.offset("d8").unwrap(), 96 * 1024);
        assert_eq!(layout.physical_offset("c").unwrap(), 128);
        assert_eq!(layout.physical_offset("d8").unwrap(), 192);
        assert_eq!(layout.remap_index(), 2);
    }

    #[test]
    fn separate_regions_must_hold_their_tensor() {
        let result = Allocator::new(AllocationPolicy::Separate {
            region_size: 1024,
            capacity: 4096,
        })
        .region("a", 1024)
        .allocate();
        assert!(matches!(result, Err(DatagenError::CapacityExceeded { .. })));
    }

    #[test]
    fn separate_regions_must_fit_memory() {
        let result = Allocator::new(AllocationPolicy::Separate {
            region_size: 1024,
            capacity: 2048,
        })
        .region("a", 8)
        .region("b", 8)
        .region("c", 8)
        .allocate();
        assert!(matches!(result, Err(DatagenError::CapacityExceeded { .. })));
    }
}
