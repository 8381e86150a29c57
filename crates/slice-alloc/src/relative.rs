//! Relative grow/shrink of a single slice
//!
//! Moves one slice toward a target unit count with the fewest bit flips.
//! Growth claims free units outward from the slice's existing block (first to
//! the right, then to the left) and shrinking releases units from the right
//! edge, so a slice's run stays as contiguous as the pool allows.

use slice_core::{Error, ResourcePool, Result, SliceId, SliceMask, SliceStore};
use tracing::{info, warn};

/// What a relative adjustment did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustOutcome {
    /// The slice already had the target count
    Unchanged,

    /// Target reached by claiming the listed units
    Grown { added: Vec<usize> },

    /// Target reached by releasing the listed units
    Shrunk { released: Vec<usize> },

    /// Not enough free units below the pool limit; the units that could be
    /// claimed are kept
    Insufficient {
        added: Vec<usize>,
        reached: usize,
        target: usize,
    },
}

/// Result of [`adjust`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub mask: SliceMask,
    pub outcome: AdjustOutcome,
}

impl Adjustment {
    /// Whether the mask differs from the one passed in
    pub fn changed(&self) -> bool {
        match &self.outcome {
            AdjustOutcome::Unchanged => false,
            AdjustOutcome::Grown { .. } | AdjustOutcome::Shrunk { .. } => true,
            AdjustOutcome::Insufficient { added, .. } => !added.is_empty(),
        }
    }
}

/// Move `current` toward `target` claimed units.
///
/// `occupied` is the union of every slice's mask, including `current`; a unit
/// is free when it is unset there and below `pool.limit`.
pub fn adjust(
    current: &SliceMask,
    occupied: &SliceMask,
    target: usize,
    pool: &ResourcePool,
) -> Adjustment {
    let count = current.count();

    if count == target {
        return Adjustment {
            mask: current.clone(),
            outcome: AdjustOutcome::Unchanged,
        };
    }

    if count > target {
        return shrink(current, target);
    }

    grow(current, occupied, target, pool)
}

fn grow(current: &SliceMask, occupied: &SliceMask, target: usize, pool: &ResourcePool) -> Adjustment {
    let mut mask = current.clone();
    let mut count = mask.count();
    let mut added = Vec::new();

    let bound = pool.limit.min(mask.width());
    let anchor = current.first_index();
    let rightward = anchor.map_or(0, |first| first + 1)..bound;
    let leftward = (0..anchor.unwrap_or(0)).rev();

    for idx in rightward.chain(leftward) {
        if count == target {
            break;
        }
        if idx >= bound || occupied.is_set(idx) || mask.is_set(idx) {
            continue;
        }
        // idx < bound <= width, so set cannot fail
        if let Ok(true) = mask.set(idx) {
            added.push(idx);
            count += 1;
        }
    }

    let outcome = if count == target {
        AdjustOutcome::Grown { added }
    } else {
        AdjustOutcome::Insufficient {
            added,
            reached: count,
            target,
        }
    };

    Adjustment { mask, outcome }
}

fn shrink(current: &SliceMask, target: usize) -> Adjustment {
    let mut mask = current.clone();
    let mut released = Vec::new();

    while mask.count() > target {
        let Some(idx) = mask.last_index() else {
            break;
        };
        if let Ok(true) = mask.clear(idx) {
            released.push(idx);
        }
    }

    Adjustment {
        mask,
        outcome: AdjustOutcome::Shrunk { released },
    }
}

/// Applies relative adjustments to the masks held by a store
#[derive(Debug)]
pub struct RelativeAdjuster<S> {
    store: S,
    pool: ResourcePool,
    tenants: usize,
}

impl<S: SliceStore> RelativeAdjuster<S> {
    pub fn new(store: S, pool: ResourcePool, tenants: usize) -> Self {
        Self {
            store,
            pool,
            tenants,
        }
    }

    /// Move `slice` toward `target` units and persist the mask if it changed
    pub fn adjust_slice(&mut self, slice: SliceId, target: usize) -> Result<Adjustment> {
        if slice >= self.tenants {
            return Err(Error::invalid_request(format!(
                "Slice {} is not configured ({} tenants)",
                slice, self.tenants
            )));
        }

        let masks = self.store.read_masks(self.tenants)?;
        let mut occupied = self.pool.empty_mask();
        for mask in &masks {
            occupied.merge(mask);
        }

        let current = &masks[slice];
        let adjustment = adjust(current, &occupied, target, &self.pool);

        match &adjustment.outcome {
            AdjustOutcome::Unchanged => {
                info!(slice, units = target, "No change needed in slice allocation");
            }
            AdjustOutcome::Grown { added } => {
                info!(slice, added = ?added, "Increased slice resources");
            }
            AdjustOutcome::Shrunk { released } => {
                info!(slice, released = ?released, "Decreased slice resources");
            }
            AdjustOutcome::Insufficient { reached, target, .. } => {
                warn!(slice, reached, target, "No more resources available");
            }
        }

        if adjustment.changed() {
            self.store.write_mask(slice, &adjustment.mask)?;
            info!(slice, mask = %adjustment.mask, "Slicing mask written");
        }

        Ok(adjustment)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_store::MemoryStore;

    fn mask(width: usize, indices: &[usize]) -> SliceMask {
        SliceMask::from_indices(width, indices.iter().copied()).unwrap()
    }

    fn occupied(masks: &[&SliceMask]) -> SliceMask {
        let mut union = SliceMask::new(masks[0].width());
        for m in masks {
            union.merge(m);
        }
        union
    }

    #[test]
    fn test_shrink_releases_from_the_right() {
        let current = mask(10, &[3, 4, 5]);
        let result = adjust(&current, &current, 1, &ResourcePool::new(10));

        assert_eq!(result.mask.indices().collect::<Vec<_>>(), vec![3]);
        assert_eq!(result.outcome, AdjustOutcome::Shrunk { released: vec![5, 4] });
        assert!(result.changed());
    }

    #[test]
    fn test_no_op_when_count_matches() {
        let current = mask(10, &[1, 2]);
        let result = adjust(&current, &current, 2, &ResourcePool::new(10));
        assert_eq!(result.outcome, AdjustOutcome::Unchanged);
        assert_eq!(result.mask, current);
        assert!(!result.changed());
    }

    #[test]
    fn test_grow_rightward_skips_other_slices() {
        let current = mask(10, &[3, 4]);
        let other = mask(10, &[5, 6]);
        let result = adjust(&current, &occupied(&[&current, &other]), 5, &ResourcePool::new(10));

        assert_eq!(result.mask.indices().collect::<Vec<_>>(), vec![3, 4, 7, 8, 9]);
        assert_eq!(result.outcome, AdjustOutcome::Grown { added: vec![7, 8, 9] });
        assert!(result.mask.overlap(&other).is_empty());
    }

    #[test]
    fn test_grow_turns_left_at_the_boundary() {
        let current = mask(10, &[3, 4]);
        let other = mask(10, &[5, 6]);
        let result = adjust(&current, &occupied(&[&current, &other]), 7, &ResourcePool::new(10));

        assert_eq!(result.mask.indices().collect::<Vec<_>>(), vec![1, 2, 3, 4, 7, 8, 9]);
        assert_eq!(
            result.outcome,
            AdjustOutcome::Grown { added: vec![7, 8, 9, 2, 1] }
        );
    }

    #[test]
    fn test_grow_reports_insufficient_resources() {
        let current = mask(10, &[3, 4]);
        let other = mask(10, &[5, 6]);
        let result = adjust(&current, &occupied(&[&current, &other]), 10, &ResourcePool::new(10));

        assert_eq!(result.mask.count(), 8);
        assert!(matches!(
            result.outcome,
            AdjustOutcome::Insufficient { reached: 8, target: 10, .. }
        ));
        assert!(result.changed());
        assert!(result.mask.overlap(&other).is_empty());
    }

    #[test]
    fn test_grow_respects_pool_limit() {
        let current = mask(10, &[0]);
        let pool = ResourcePool::new(10).with_limit(3);
        let result = adjust(&current, &current, 5, &pool);

        assert_eq!(result.mask.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(matches!(result.outcome, AdjustOutcome::Insufficient { reached: 3, .. }));
    }

    #[test]
    fn test_grow_from_empty_mask_starts_at_zero() {
        let current = SliceMask::new(6);
        let other = mask(6, &[0, 1]);
        let result = adjust(&current, &other, 2, &ResourcePool::new(6));
        assert_eq!(result.mask.indices().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_nothing_free_leaves_mask_untouched() {
        let current = mask(4, &[0, 1]);
        let other = mask(4, &[2, 3]);
        let result = adjust(&current, &occupied(&[&current, &other]), 3, &ResourcePool::new(4));
        assert_eq!(result.mask, current);
        assert!(!result.changed());
    }

    #[test]
    fn test_convergence_never_steals() {
        let width = 25;
        let other = mask(width, &[0, 1, 10, 11, 12, 20]);
        let available = width - other.count();

        for start in [vec![], vec![5], vec![2, 3, 4], vec![13, 14, 15, 16]] {
            for target in 0..=available {
                let mut current = mask(width, &start);
                // repeated application must converge and then stay put
                for _ in 0..3 {
                    let union = occupied(&[&current, &other]);
                    current = adjust(&current, &union, target, &ResourcePool::new(width)).mask;
                }
                assert_eq!(current.count(), target, "start {:?} target {}", start, target);
                assert!(current.overlap(&other).is_empty());
            }
        }
    }

    #[test]
    fn test_adjuster_writes_only_on_change() {
        let store = MemoryStore::new(10)
            .with_mask(0, mask(10, &[0, 1]))
            .with_mask(1, mask(10, &[2, 3]));
        let mut adjuster = RelativeAdjuster::new(store, ResourcePool::new(10), 2);

        let result = adjuster.adjust_slice(0, 2).unwrap();
        assert!(!result.changed());
        assert_eq!(adjuster.store().mask_writes(), 0);

        let result = adjuster.adjust_slice(0, 4).unwrap();
        assert_eq!(result.outcome, AdjustOutcome::Grown { added: vec![4, 5] });
        assert_eq!(adjuster.store().mask_writes(), 1);
        assert_eq!(
            adjuster.store().read_mask(0).unwrap().to_string(),
            "1100110000"
        );

        assert!(adjuster.adjust_slice(2, 1).is_err());
    }
}
