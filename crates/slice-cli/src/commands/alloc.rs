//! Whole-partition allocation commands

use super::{views, SliceView};
use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{Context, Result};
use slice_alloc::{check_partition, AllocationRequest, MaskAllocator};
use slice_core::{SliceConfig, SliceId, SliceMask, SliceRange, SliceStore};
use std::collections::BTreeMap;

/// Parse `slice=min-max` (or `slice=none`)
pub fn parse_range_assignment(s: &str) -> std::result::Result<(SliceId, SliceRange), String> {
    let (slice, range) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SLICE=MIN-MAX, got '{}'", s))?;
    let slice: SliceId = slice
        .trim()
        .parse()
        .map_err(|_| format!("invalid slice id '{}'", slice.trim()))?;
    let range: SliceRange = range.trim().parse().map_err(|e| format!("{}", e))?;
    Ok((slice, range))
}

/// Apply an allocation request and describe the written masks
pub fn apply<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    request: &AllocationRequest,
) -> slice_core::Result<Vec<SliceView>> {
    let mut allocator = MaskAllocator::new(&mut *store, config.pool, config.tenants);
    let written = allocator.apply(request)?;
    views(store, &written)
}

/// Handle `slicectl equal`
pub fn handle_equal<S: SliceStore>(store: &mut S, config: &SliceConfig, output: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output);
    let written = apply(store, config, &AllocationRequest::Equal).context("Equal allocation failed")?;

    formatter.print_list(&written)?;
    formatter.print_success(&format!("Pool split among {} slices", config.tenants))
}

/// Handle `slicectl range`
pub fn handle_range<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    ranges: Vec<(SliceId, SliceRange)>,
    output: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output);
    let ranges: BTreeMap<SliceId, SliceRange> = ranges.into_iter().collect();

    let written = apply(store, config, &AllocationRequest::Ranges(ranges)).context("Range allocation failed")?;

    let masks: BTreeMap<SliceId, SliceMask> = store.read_masks(config.tenants)?.into_iter().enumerate().collect();
    for overlap in check_partition(&masks) {
        formatter.print_warning(&format!(
            "Unit {} is claimed by slices {} and {}",
            overlap.index, overlap.first, overlap.second
        ))?;
    }

    formatter.print_list(&written)?;
    formatter.print_success(&format!("{} masks written", written.len()))
}

/// Handle `slicectl set-mask`
pub fn handle_set_mask<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    slice: SliceId,
    mask: SliceMask,
    output: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output);
    let written = apply(store, config, &AllocationRequest::Full { slice, mask })
        .with_context(|| format!("Writing mask of slice {} failed", slice))?;

    formatter.print_list(&written)?;
    formatter.print_success(&format!("Mask of slice {} written", slice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_core::ResourcePool;
    use slice_store::MemoryStore;

    fn config(size: usize, tenants: usize) -> SliceConfig {
        SliceConfig {
            tenants,
            pool: ResourcePool::new(size),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_range_assignment() {
        assert_eq!(parse_range_assignment("0=0-11").unwrap(), (0, SliceRange::new(0, 11)));
        assert_eq!(parse_range_assignment("2 = 5").unwrap(), (2, SliceRange::new(5, 5)));
        assert_eq!(parse_range_assignment("1=none").unwrap(), (1, SliceRange::NONE));
        assert!(parse_range_assignment("0-11").is_err());
        assert!(parse_range_assignment("x=0-11").is_err());
    }

    #[test]
    fn test_apply_equal() {
        let mut store = MemoryStore::new(25);
        let written = apply(&mut store, &config(25, 2), &AllocationRequest::Equal).unwrap();

        assert_eq!(written.len(), 2);
        assert_eq!(written[0].units, 12);
        assert_eq!(written[0].runs, "0-11");
        assert_eq!(written[1].runs, "12-23");
        assert_eq!(store.mask_writes(), 2);
    }

    #[test]
    fn test_apply_full_rejects_wrong_width() {
        let mut store = MemoryStore::new(10);
        let request = AllocationRequest::Full {
            slice: 0,
            mask: "1100".parse().unwrap(),
        };
        assert!(apply(&mut store, &config(10, 2), &request).is_err());
        assert_eq!(store.mask_writes(), 0);
    }
}
