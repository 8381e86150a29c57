//! Rotation controller: cycles through fixed range allocations

use crate::controller::IterationReport;
use slice_alloc::MaskAllocator;
use slice_core::{ResourcePool, Result, SliceId, SliceRange, SliceStore};
use std::collections::BTreeMap;
use tracing::{error, info};

/// Applies the configured allocations in turn, wrapping around at the end
#[derive(Debug)]
pub struct RotationController<S> {
    allocator: MaskAllocator<S>,
    allocations: Vec<BTreeMap<SliceId, SliceRange>>,
    next: usize,
    round: u64,
}

impl<S: SliceStore> RotationController<S> {
    pub fn new(
        store: S,
        pool: ResourcePool,
        tenants: usize,
        allocations: Vec<BTreeMap<SliceId, SliceRange>>,
    ) -> Self {
        Self {
            allocator: MaskAllocator::new(store, pool, tenants),
            allocations,
            next: 0,
            round: 0,
        }
    }

    /// Apply the next allocation of the cycle, recording a failure in the
    /// report
    pub fn step(&mut self) -> IterationReport {
        let round = self.round;
        let position = self.next;

        match self.try_step() {
            Ok(report) => report,
            Err(e) => {
                error!(position, category = e.category(), error = %e, "Failed to apply rotation allocation");
                let mut report = IterationReport::new(round);
                report.record_error(&format!("allocation {}", position), &e);
                report
            }
        }
    }

    /// Apply the next allocation of the cycle. The cycle advances even when
    /// the allocation fails.
    pub fn try_step(&mut self) -> Result<IterationReport> {
        let mut report = IterationReport::new(self.round);
        self.round += 1;

        if self.allocations.is_empty() {
            return Ok(report);
        }

        let position = self.next;
        self.next = (self.next + 1) % self.allocations.len();

        info!(round = report.round, position, "Applying rotation allocation");
        let written = self.allocator.ranges(&self.allocations[position])?;
        report.masks_written = written.into_keys().collect();

        Ok(report)
    }

    /// Index of the allocation the next step applies
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn store(&self) -> &S {
        self.allocator.store()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.allocator.store_mut()
    }
}
