//! Core traits for slicing components
//!
//! The persistence trait is the only seam between the allocation logic and the
//! records the radio stack reads. Implementations live in `slice-store`.

use crate::{Result, SliceId, SliceMask, SlicePolicies};

/// Read/write access to the persisted slice masks and scheduling policies.
///
/// Writes must be atomic from the point of view of an external reader: a
/// reader observes either the previous record or the new one, never a
/// partially written file. There is a single writer by convention, so no
/// locking is provided.
pub trait SliceStore {
    /// Read the persisted mask of a slice. An absent record is an
    /// unassigned mask, not an error.
    fn read_mask(&self, slice: SliceId) -> Result<SliceMask>;

    /// Whether a mask record exists for the slice
    fn mask_exists(&self, slice: SliceId) -> Result<bool>;

    /// Replace the mask record of a slice
    fn write_mask(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()>;

    /// Read the scheduling policy of every configured slice
    fn read_policies(&self) -> Result<SlicePolicies>;

    /// Replace the policy record as a whole
    fn write_policies(&mut self, policies: &SlicePolicies) -> Result<()>;

    /// Read the masks of slices `[0, tenants)`
    fn read_masks(&self, tenants: usize) -> Result<Vec<SliceMask>> {
        (0..tenants).map(|slice| self.read_mask(slice)).collect()
    }
}

impl<S: SliceStore + ?Sized> SliceStore for &mut S {
    fn read_mask(&self, slice: SliceId) -> Result<SliceMask> {
        (**self).read_mask(slice)
    }

    fn mask_exists(&self, slice: SliceId) -> Result<bool> {
        (**self).mask_exists(slice)
    }

    fn write_mask(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()> {
        (**self).write_mask(slice, mask)
    }

    fn read_policies(&self) -> Result<SlicePolicies> {
        (**self).read_policies()
    }

    fn write_policies(&mut self, policies: &SlicePolicies) -> Result<()> {
        (**self).write_policies(policies)
    }
}
