//! # slice-alloc
//!
//! Computes and mutates the partition of resource block groups across slices.
//!
//! This crate provides:
//! - Pure allocation policies: equal split, explicit ranges, and relative
//!   grow/shrink of a single slice
//! - [`MaskAllocator`] and [`RelativeAdjuster`], which apply those policies
//!   to a [`slice_core::SliceStore`]
//!
//! ## Example
//!
//! ```rust
//! use slice_alloc::equal_allocation;
//! use slice_core::ResourcePool;
//!
//! let masks = equal_allocation(&ResourcePool::new(25), 2).unwrap();
//! assert_eq!(masks[&0].to_string(), "1111111111110000000000000");
//! assert_eq!(masks[&1].to_string(), "0000000000001111111111110");
//! ```

pub mod allocator;
pub mod relative;

pub use allocator::{
    check_partition, equal_allocation, range_allocation, AllocationRequest, MaskAllocator,
    Overlap,
};
pub use relative::{adjust, AdjustOutcome, Adjustment, RelativeAdjuster};
