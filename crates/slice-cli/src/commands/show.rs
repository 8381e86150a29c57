//! Inspection of the persisted records

use super::all_views;
use crate::output::{OutputFormat, OutputFormatter};
use anyhow::Result;
use slice_alloc::check_partition;
use slice_core::{SliceConfig, SliceId, SliceMask, SliceStore};
use std::collections::BTreeMap;

/// Handle `slicectl show`
pub fn handle_show<S: SliceStore>(store: &S, config: &SliceConfig, output: OutputFormat) -> Result<()> {
    let formatter = OutputFormatter::new(output);
    let views = all_views(store, config.tenants)?;

    let masks: BTreeMap<SliceId, SliceMask> = views.iter().map(|v| (v.slice, v.mask.clone())).collect();
    for overlap in check_partition(&masks) {
        formatter.print_warning(&format!(
            "Unit {} is claimed by slices {} and {}",
            overlap.index, overlap.first, overlap.second
        ))?;
    }

    formatter.print_list(&views)?;

    if matches!(output, OutputFormat::Table | OutputFormat::Text) {
        let claimed: usize = views.iter().map(|v| v.units).sum();
        formatter.print_info(&format!(
            "{} of {} units assigned (limit {})",
            claimed, config.pool.size, config.pool.limit
        ))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_store::MemoryStore;

    #[test]
    fn test_show_lists_every_slice() {
        let config = SliceConfig::default();
        let store = MemoryStore::new(25).with_mask(1, SliceMask::from_indices(25, 12..24).unwrap());

        let views = all_views(&store, config.tenants).unwrap();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].units, 0);
        assert_eq!(views[0].runs, "-");
        assert_eq!(views[1].runs, "12-23");

        handle_show(&store, &config, OutputFormat::Json).unwrap();
    }
}
