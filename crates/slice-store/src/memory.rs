//! In-memory slice store

use crate::StoreStats;
use slice_core::{Error, Result, SliceId, SliceMask, SlicePolicies, SliceStore};
use std::collections::BTreeMap;

/// In-memory storage implementation
///
/// Used for dry runs of the daemon and by tests. Write failures can be
/// injected with [`MemoryStore::set_fail_writes`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Width of the masks handed out for absent records
    width: usize,

    /// Mask records by slice
    masks: BTreeMap<SliceId, SliceMask>,

    /// Policy record, `None` until first written
    policies: Option<SlicePolicies>,

    /// Reject every write with a persistence error
    fail_writes: bool,

    /// Write statistics
    stats: StoreStats,
}

impl MemoryStore {
    /// Create an empty store handing out masks of `width` units
    pub fn new(width: usize) -> Self {
        Self {
            width,
            ..Default::default()
        }
    }

    /// Seed a mask record without counting it as a write
    pub fn with_mask(mut self, slice: SliceId, mask: SliceMask) -> Self {
        self.masks.insert(slice, mask);
        self
    }

    /// Seed the policy record without counting it as a write
    pub fn with_policies(mut self, policies: SlicePolicies) -> Self {
        self.policies = Some(policies);
        self
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn mask_writes(&self) -> u64 {
        self.stats.mask_writes
    }

    pub fn policy_writes(&self) -> u64 {
        self.stats.policy_writes
    }

    pub fn stats(&self) -> StoreStats {
        self.stats.clone()
    }

    fn check_writable(&mut self, what: &str) -> Result<()> {
        if self.fail_writes {
            self.stats.failed_writes += 1;
            return Err(Error::persistence(format!("{} write rejected", what)));
        }
        Ok(())
    }
}

impl SliceStore for MemoryStore {
    fn read_mask(&self, slice: SliceId) -> Result<SliceMask> {
        Ok(self
            .masks
            .get(&slice)
            .cloned()
            .unwrap_or_else(|| SliceMask::new(self.width)))
    }

    fn mask_exists(&self, slice: SliceId) -> Result<bool> {
        Ok(self.masks.contains_key(&slice))
    }

    fn write_mask(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()> {
        self.check_writable("Mask")?;
        self.masks.insert(slice, mask.clone());
        self.stats.mask_writes += 1;
        Ok(())
    }

    fn read_policies(&self) -> Result<SlicePolicies> {
        Ok(self.policies.clone().unwrap_or_default())
    }

    fn write_policies(&mut self, policies: &SlicePolicies) -> Result<()> {
        self.check_writable("Policy")?;
        self.policies = Some(policies.clone());
        self.stats.policy_writes += 1;
        Ok(())
    }
}
