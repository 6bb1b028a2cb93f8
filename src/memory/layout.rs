use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{DatagenError, Result};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Region {
    pub name: String,
    pub offset: u64,
    pub length: u64,
    /// Offset seen by the banks after address remapping. Equal to `offset` for interleaved layouts.
    pub physical_offset: u64,
    pub alias_of: Option<String>,
}

impl Region {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    fn overlaps(&self, other: &Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// Allocated regions in request order, with a name index.
#[derive(Clone, Debug, Default)]
pub struct AddressLayout {
    regions: Vec<Region>,
    index: FxHashMap<String, usize>,
    remap_index: u32,
}

impl AddressLayout {
    pub(super) fn new(remap_index: u32) -> Self {
        Self {
            remap_index,
            ..Default::default()
        }
    }

    pub(super) fn insert(&mut self, region: Region) -> Result<()> {
        if self.index.contains_key(&region.name) {
            return Err(DatagenError::config(
                &region.name,
                "tensor was allocated twice",
            ));
        }
        if region.alias_of.is_none() {
            if let Some(clash) = self
                .regions
                .iter()
                .filter(|r| r.alias_of.is_none())
                .find(|r| r.overlaps(&region))
            {
                return Err(DatagenError::config(
                    &region.name,
                    format!("region overlaps `{}`", clash.name),
                ));
            }
        }
        self.index.insert(region.name.clone(), self.regions.len());
        self.regions.push(region);
        Ok(())
    }

    pub fn region(&self, name: &str) -> Result<&Region> {
        self.index
            .get(name)
            .map(|idx| &self.regions[*idx])
            .ok_or_else(|| DatagenError::config(name, "no region was allocated for this tensor"))
    }

    pub fn offset(&self, name: &str) -> Result<u64> {
        Ok(self.region(name)?.offset)
    }

    pub fn length(&self, name: &str) -> Result<u64> {
        Ok(self.region(name)?.length)
    }

    pub fn physical_offset(&self, name: &str) -> Result<u64> {
        Ok(self.region(name)?.physical_offset)
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn remap_index(&self) -> u32 {
        self.remap_index
    }

    /// One past the last byte used by any region.
    pub fn end(&self) -> u64 {
        self.regions.iter().map(Region::end).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressLayout, Region};

    fn region(name: &str, offset: u64, length: u64) -> Region {
        Region {
            name: name.to_string(),
            offset,
            length,
            physical_offset: offset,
            alias_of: None,
        }
    }

    #[test]
    fn overlapping_regions_are_rejected() {
        let mut layout = AddressLayout::new(0);
        layout.insert(region("a", 0, 128)).unwrap();
        assert!(layout.insert(region("b", 64, 8)).is_err());
        layout.insert(region("c", 128, 8)).unwrap();
        assert_eq!(layout.end(), 136);
    }

    #[test]
    fn names_are_unique() {
        let mut layout = AddressLayout::new(0);
        layout.insert(region("a", 0, 8)).unwrap();
        assert!(layout.insert(region("a", 64, 8)).is_err());
        assert!(layout.region("b").is_err());
    }
}
