//! # slice-core
//!
//! Core types, traits, and utilities for sliced - an adaptive RBG slicing
//! controller for sliced cellular base stations.
//!
//! This crate provides the foundational data structures and interfaces that are
//! shared across all other slicing components. It includes:
//!
//! - Resource pool, slice mask, and scheduling policy types
//! - The persistence trait consumed by the allocator and the controller
//! - Configuration schema and parsing utilities
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{SliceConfig, StoreConfig, MAX_TENANTS};
pub use error::{Error, ErrorContext, Result};
pub use traits::SliceStore;
pub use types::{
    MetricsSnapshot, ResourcePool, SliceId, SliceMask, SliceMetricsSample, SlicePolicies,
    SlicePolicy, SliceRange,
};
