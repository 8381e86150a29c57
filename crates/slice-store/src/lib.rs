//! Slice record storage implementations
//!
//! [`FileStore`] owns the text records consumed by the radio stack: one mask
//! file per slice and a single policy file. [`MemoryStore`] keeps the same
//! records in memory for dry runs and tests.

use serde::{Deserialize, Serialize};
use slice_core::{Result, SliceId, SliceMask, SlicePolicies, SliceStore};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Store backend enum to replace trait objects
#[derive(Debug)]
pub enum StoreBackend {
    File(FileStore),
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Short name of the backend for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
        }
    }

    /// Get write statistics
    pub fn stats(&self) -> StoreStats {
        match self {
            Self::File(store) => store.stats(),
            Self::Memory(store) => store.stats(),
        }
    }
}

impl SliceStore for StoreBackend {
    fn read_mask(&self, slice: SliceId) -> Result<SliceMask> {
        match self {
            Self::File(store) => store.read_mask(slice),
            Self::Memory(store) => store.read_mask(slice),
        }
    }

    fn mask_exists(&self, slice: SliceId) -> Result<bool> {
        match self {
            Self::File(store) => store.mask_exists(slice),
            Self::Memory(store) => store.mask_exists(slice),
        }
    }

    fn write_mask(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()> {
        match self {
            Self::File(store) => store.write_mask(slice, mask),
            Self::Memory(store) => store.write_mask(slice, mask),
        }
    }

    fn read_policies(&self) -> Result<SlicePolicies> {
        match self {
            Self::File(store) => store.read_policies(),
            Self::Memory(store) => store.read_policies(),
        }
    }

    fn write_policies(&mut self, policies: &SlicePolicies) -> Result<()> {
        match self {
            Self::File(store) => store.write_policies(policies),
            Self::Memory(store) => store.write_policies(policies),
        }
    }
}

/// Store write statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Mask records replaced
    pub mask_writes: u64,

    /// Policy records replaced
    pub policy_writes: u64,

    /// Writes that failed
    pub failed_writes: u64,
}
