//! Whole-partition allocation policies

use serde::{Deserialize, Serialize};
use slice_core::{Error, ResourcePool, Result, SliceId, SliceMask, SliceRange, SliceStore};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Tenant count for which the first and last slices get one extra unit each.
/// The first slice loses capacity to the control channel and the last RBG of
/// the carrier is usually shorter than the others.
const EXTRA_UNIT_TENANTS: usize = 3;

/// How the masks of the slices should be (re)computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationRequest {
    /// Split the pool evenly among all slices
    Equal,

    /// Explicit inclusive index range per slice; missing slices get no allocation
    Ranges(BTreeMap<SliceId, SliceRange>),

    /// Write an already computed mask verbatim for one slice
    Full { slice: SliceId, mask: SliceMask },
}

/// A unit claimed by two slices at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub first: SliceId,
    pub second: SliceId,
    pub index: usize,
}

/// Split the pool evenly: every slice gets `floor(limit / tenants)` of the
/// lowest units not claimed by a lower-numbered slice. Units that do not
/// divide evenly stay unassigned, except with three tenants where slice 0 and
/// the last slice each take the next free unit when one is left.
pub fn equal_allocation(
    pool: &ResourcePool,
    tenants: usize,
) -> Result<BTreeMap<SliceId, SliceMask>> {
    if tenants == 0 {
        return Err(Error::config("Equal allocation needs at least one tenant"));
    }
    if pool.limit < tenants {
        return Err(Error::config(format!(
            "Cannot split {} claimable units among {} tenants",
            pool.limit, tenants
        )));
    }

    let per_slice = pool.limit / tenants;
    let mut claimed = pool.empty_mask();
    let mut masks = BTreeMap::new();

    for slice in 0..tenants {
        let free: Vec<usize> = (0..pool.limit).filter(|idx| !claimed.is_set(*idx)).collect();

        let mut mask = pool.empty_mask();
        for idx in free.iter().take(per_slice) {
            mask.set(*idx)?;
        }

        if tenants == EXTRA_UNIT_TENANTS && (slice == 0 || slice == tenants - 1) {
            match free.get(per_slice) {
                Some(idx) => {
                    mask.set(*idx)?;
                }
                None => warn!(slice, "No unit left for the extra allocation"),
            }
        }

        claimed.merge(&mask);
        debug!(slice, mask = %mask, "Equal allocation");
        masks.insert(slice, mask);
    }

    Ok(masks)
}

/// Build masks from explicit inclusive ranges.
///
/// Every slice in `[0, tenants)` gets a mask; a slice missing from `ranges`
/// is treated as the [`SliceRange::NONE`] sentinel. A sentinel never
/// clobbers a slice whose `persisted` mask already claims units: such slices
/// are left out of the result so nothing is written for them.
///
/// Overlapping ranges are the caller's responsibility. They are reported as
/// warnings and passed through unchanged.
pub fn range_allocation(
    ranges: &BTreeMap<SliceId, SliceRange>,
    pool: &ResourcePool,
    tenants: usize,
    persisted: &BTreeMap<SliceId, SliceMask>,
) -> Result<BTreeMap<SliceId, SliceMask>> {
    if let Some(slice) = ranges.keys().find(|slice| **slice >= tenants) {
        return Err(Error::invalid_request(format!(
            "Range given for slice {} but only {} tenants are configured",
            slice, tenants
        )));
    }

    let mut masks = BTreeMap::new();

    for slice in 0..tenants {
        let range = ranges.get(&slice).copied().unwrap_or(SliceRange::NONE);

        let has_resources = persisted
            .get(&slice)
            .is_some_and(|mask| !mask.is_unassigned());
        if range.is_none() && has_resources {
            debug!(slice, "No allocation requested, keeping persisted mask");
            continue;
        }

        let indices = (0..pool.limit).filter(|idx| range.contains(*idx));
        let mask = SliceMask::from_indices(pool.size, indices)?;
        debug!(slice, range = %range, mask = %mask, "Range allocation");
        masks.insert(slice, mask);
    }

    for overlap in check_partition(&masks) {
        warn!(
            first = overlap.first,
            second = overlap.second,
            index = overlap.index,
            "Requested ranges overlap"
        );
    }

    Ok(masks)
}

/// Every unit claimed by more than one slice
pub fn check_partition(masks: &BTreeMap<SliceId, SliceMask>) -> Vec<Overlap> {
    let entries: Vec<_> = masks.iter().collect();
    let mut overlaps = Vec::new();

    for (pos, (first, first_mask)) in entries.iter().enumerate() {
        for (second, second_mask) in &entries[pos + 1..] {
            overlaps.extend(first_mask.overlap(second_mask).into_iter().map(|index| {
                Overlap {
                    first: **first,
                    second: **second,
                    index,
                }
            }));
        }
    }

    overlaps
}

/// Applies allocation requests to a persistence store
#[derive(Debug)]
pub struct MaskAllocator<S> {
    store: S,
    pool: ResourcePool,
    tenants: usize,
}

impl<S: SliceStore> MaskAllocator<S> {
    pub fn new(store: S, pool: ResourcePool, tenants: usize) -> Self {
        Self {
            store,
            pool,
            tenants,
        }
    }

    /// Compute and persist the masks for a request. Returns the masks that
    /// were written.
    pub fn apply(&mut self, request: &AllocationRequest) -> Result<BTreeMap<SliceId, SliceMask>> {
        match request {
            AllocationRequest::Equal => self.equal(),
            AllocationRequest::Ranges(ranges) => self.ranges(ranges),
            AllocationRequest::Full { slice, mask } => {
                self.assign_full(*slice, mask)?;
                Ok(BTreeMap::from([(*slice, mask.clone())]))
            }
        }
    }

    /// Split the pool evenly and persist every mask
    pub fn equal(&mut self) -> Result<BTreeMap<SliceId, SliceMask>> {
        info!(tenants = self.tenants, "Equally assigning slice resources");
        let masks = equal_allocation(&self.pool, self.tenants)?;
        self.write_all(&masks)?;
        Ok(masks)
    }

    /// Apply explicit ranges and persist the resulting masks
    pub fn ranges(
        &mut self,
        ranges: &BTreeMap<SliceId, SliceRange>,
    ) -> Result<BTreeMap<SliceId, SliceMask>> {
        info!(requested = ranges.len(), "Assigning passed slice resources");

        let mut persisted = BTreeMap::new();
        for slice in 0..self.tenants {
            if self.store.mask_exists(slice)? {
                persisted.insert(slice, self.store.read_mask(slice)?);
            }
        }

        let masks = range_allocation(ranges, &self.pool, self.tenants, &persisted)?;
        self.write_all(&masks)?;
        Ok(masks)
    }

    /// Persist a caller-supplied mask for one slice without recomputation
    pub fn assign_full(&mut self, slice: SliceId, mask: &SliceMask) -> Result<()> {
        if slice >= self.tenants {
            return Err(Error::invalid_request(format!(
                "Slice {} is not configured ({} tenants)",
                slice, self.tenants
            )));
        }
        if mask.width() != self.pool.size {
            return Err(Error::invalid_mask(format!(
                "mask {} has {} units, pool has {}",
                mask,
                mask.width(),
                self.pool.size
            )));
        }

        info!(slice, mask = %mask, "Writing full mask");
        self.store.write_mask(slice, mask)
    }

    fn write_all(&mut self, masks: &BTreeMap<SliceId, SliceMask>) -> Result<()> {
        for (slice, mask) in masks {
            self.store.write_mask(*slice, mask)?;
            info!(slice = *slice, mask = %mask, "Slicing mask written");
        }
        Ok(())
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_store::MemoryStore;

    fn indices(mask: &SliceMask) -> Vec<usize> {
        mask.indices().collect()
    }

    fn total_units(masks: &BTreeMap<SliceId, SliceMask>) -> usize {
        masks.values().map(SliceMask::count).sum()
    }

    #[test]
    fn test_equal_allocation_two_tenants() {
        let masks = equal_allocation(&ResourcePool::new(25), 2).unwrap();

        assert_eq!(indices(&masks[&0]), (0..12).collect::<Vec<_>>());
        assert_eq!(indices(&masks[&1]), (12..24).collect::<Vec<_>>());
        assert!(!masks[&0].is_set(24) && !masks[&1].is_set(24));
    }

    #[test]
    fn test_equal_allocation_partition_and_conservation() {
        let pool = ResourcePool::new(25);
        for tenants in 1..=10 {
            let masks = equal_allocation(&pool, tenants).unwrap();
            assert_eq!(masks.len(), tenants);
            assert!(check_partition(&masks).is_empty(), "tenants = {}", tenants);
            if tenants != 3 {
                assert_eq!(total_units(&masks), tenants * (25 / tenants));
            }
        }
    }

    #[test]
    fn test_equal_allocation_three_tenants_extra_units() {
        // 26 = 3 * 8 + 2: both extra units fit
        let masks = equal_allocation(&ResourcePool::new(26), 3).unwrap();
        assert_eq!(total_units(&masks), 3 * 8 + 2);
        assert_eq!(indices(&masks[&0]), (0..9).collect::<Vec<_>>());
        assert_eq!(indices(&masks[&1]), (9..17).collect::<Vec<_>>());
        assert_eq!(indices(&masks[&2]), (17..26).collect::<Vec<_>>());
        assert!(check_partition(&masks).is_empty());
    }

    #[test]
    fn test_equal_allocation_three_tenants_exhausted_pool() {
        // 25 = 3 * 8 + 1: only the first slice can take its extra unit
        let masks = equal_allocation(&ResourcePool::new(25), 3).unwrap();
        assert_eq!(masks[&0].count(), 9);
        assert_eq!(masks[&1].count(), 8);
        assert_eq!(masks[&2].count(), 8);
        assert_eq!(total_units(&masks), 25);
        assert!(check_partition(&masks).is_empty());
    }

    #[test]
    fn test_equal_allocation_respects_limit() {
        let pool = ResourcePool::new(25).with_limit(20);
        let masks = equal_allocation(&pool, 2).unwrap();
        assert_eq!(indices(&masks[&1]), (10..20).collect::<Vec<_>>());
        assert_eq!(masks[&1].width(), 25);
    }

    #[test]
    fn test_equal_allocation_rejects_bad_tenant_counts() {
        assert!(equal_allocation(&ResourcePool::new(25), 0).is_err());
        assert!(equal_allocation(&ResourcePool::new(2), 3).is_err());
    }

    #[test]
    fn test_equal_allocation_rejects_limit_below_tenants() {
        let err = equal_allocation(&ResourcePool::new(25).with_limit(2), 3).unwrap_err();
        assert_eq!(err.category(), "configuration");
        assert!(equal_allocation(&ResourcePool::new(25).with_limit(3), 3).is_ok());
    }

    #[test]
    fn test_range_allocation_basic() {
        let pool = ResourcePool::new(10);
        let ranges = BTreeMap::from([(0, SliceRange::new(0, 3)), (1, SliceRange::new(4, 12))]);

        let masks = range_allocation(&ranges, &pool, 3, &BTreeMap::new()).unwrap();
        assert_eq!(masks[&0].to_string(), "1111000000");
        assert_eq!(masks[&1].to_string(), "0000111111");
        // slice 2 is missing from the request and has nothing persisted
        assert!(masks[&2].is_unassigned());
        assert!(check_partition(&masks).is_empty());
    }

    #[test]
    fn test_range_allocation_sentinel_keeps_persisted_mask() {
        let pool = ResourcePool::new(6);
        let persisted = BTreeMap::from([
            (0, "110000".parse::<SliceMask>().unwrap()),
            (1, "000000".parse::<SliceMask>().unwrap()),
        ]);
        let ranges = BTreeMap::from([(0, SliceRange::NONE), (1, SliceRange::NONE)]);

        let masks = range_allocation(&ranges, &pool, 2, &persisted).unwrap();
        assert!(!masks.contains_key(&0));
        assert!(masks[&1].is_unassigned());
    }

    #[test]
    fn test_range_allocation_partial_negative_bound_clears() {
        let pool = ResourcePool::new(6);
        let persisted = BTreeMap::from([(0, "110000".parse::<SliceMask>().unwrap())]);
        let ranges = BTreeMap::from([(0, SliceRange::new(-1, 3))]);

        let masks = range_allocation(&ranges, &pool, 1, &persisted).unwrap();
        assert!(masks[&0].is_unassigned());
    }

    #[test]
    fn test_range_allocation_rejects_unknown_slice() {
        let ranges = BTreeMap::from([(4, SliceRange::new(0, 1))]);
        assert!(range_allocation(&ranges, &ResourcePool::new(10), 2, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_range_allocation_passes_overlap_through() {
        let ranges = BTreeMap::from([(0, SliceRange::new(0, 4)), (1, SliceRange::new(3, 6))]);
        let masks = range_allocation(&ranges, &ResourcePool::new(10), 2, &BTreeMap::new()).unwrap();

        let overlaps = check_partition(&masks);
        assert_eq!(
            overlaps,
            vec![
                Overlap { first: 0, second: 1, index: 3 },
                Overlap { first: 0, second: 1, index: 4 },
            ]
        );
    }

    #[test]
    fn test_allocator_equal_writes_every_slice() {
        let mut allocator = MaskAllocator::new(MemoryStore::new(25), ResourcePool::new(25), 3);
        allocator.apply(&AllocationRequest::Equal).unwrap();

        let store = allocator.into_store();
        assert_eq!(store.mask_writes(), 3);
        assert_eq!(store.read_mask(0).unwrap().count(), 9);
    }

    #[test]
    fn test_allocator_sentinel_is_idempotent() {
        let existing: SliceMask = "1100000000".parse().unwrap();
        let store = MemoryStore::new(10).with_mask(0, existing.clone());
        let mut allocator = MaskAllocator::new(store, ResourcePool::new(10), 2);

        let request = AllocationRequest::Ranges(BTreeMap::from([(1, SliceRange::new(5, 9))]));
        let written = allocator.apply(&request).unwrap();
        assert!(!written.contains_key(&0));

        // applying it again leaves slice 0 untouched as well
        allocator.apply(&request).unwrap();
        assert_eq!(allocator.store().read_mask(0).unwrap(), existing);
        assert_eq!(
            allocator.store().read_mask(1).unwrap().to_string(),
            "0000011111"
        );
    }

    #[test]
    fn test_allocator_full_mask() {
        let mut allocator = MaskAllocator::new(MemoryStore::new(5), ResourcePool::new(5), 2);

        let mask: SliceMask = "00110".parse().unwrap();
        allocator
            .apply(&AllocationRequest::Full { slice: 1, mask: mask.clone() })
            .unwrap();
        assert_eq!(allocator.store().read_mask(1).unwrap(), mask);

        let short: SliceMask = "011".parse().unwrap();
        assert!(allocator.assign_full(1, &short).is_err());
        assert!(allocator.assign_full(2, &mask).is_err());
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"ranges": {"0": {"min": 0, "max": 4}, "1": {"min": -1, "max": -1}}}"#;
        let request: AllocationRequest = serde_json::from_str(json).unwrap();
        match request {
            AllocationRequest::Ranges(ranges) => {
                assert_eq!(ranges[&0], SliceRange::new(0, 4));
                assert!(ranges[&1].is_none());
            }
            other => panic!("unexpected request {:?}", other),
        }
    }
}
