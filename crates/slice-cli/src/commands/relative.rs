//! Relative grow/shrink of one slice

use super::{update_policy, SliceView};
use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{Context, Result};
use slice_alloc::{AdjustOutcome, RelativeAdjuster};
use slice_core::{SliceConfig, SliceId, SlicePolicy, SliceStore};
use tracing::info;

/// Outcome of `slicectl relative`
#[derive(Debug)]
pub struct RelativeResult {
    pub view: SliceView,
    pub outcome: AdjustOutcome,
    pub previous_policy: Option<SlicePolicy>,
}

/// Optionally set the slice's policy, then move it toward `units`
pub fn set_slice<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    slice: SliceId,
    units: usize,
    policy: Option<SlicePolicy>,
) -> slice_core::Result<RelativeResult> {
    let previous_policy = match policy {
        Some(policy) if slice < config.tenants => {
            let previous = update_policy(store, slice, policy)?;
            if previous.is_some() {
                info!(slice, policy = %policy, "Scheduling policy written");
            }
            previous
        }
        _ => None,
    };

    let mut adjuster = RelativeAdjuster::new(&mut *store, config.pool, config.tenants);
    let adjustment = adjuster.adjust_slice(slice, units)?;

    let current_policy = store.read_policies()?.get(slice);
    Ok(RelativeResult {
        view: SliceView::new(slice, adjustment.mask, current_policy),
        outcome: adjustment.outcome,
        previous_policy,
    })
}

/// Handle `slicectl relative`
pub fn handle_relative<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    slice: SliceId,
    units: usize,
    policy: Option<SlicePolicy>,
    output: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output);
    let result = set_slice(store, config, slice, units, policy)
        .with_context(|| format!("Adjusting slice {} failed", slice))?;

    if let (Some(previous), Some(policy)) = (result.previous_policy, policy) {
        formatter.print_info(&format!("Slice {} policy: {} -> {}", slice, previous, policy))?;
    }

    formatter.print_item(&result.view)?;

    match &result.outcome {
        AdjustOutcome::Unchanged => formatter.print_info(&format!("Slice {} already has {} units", slice, units)),
        AdjustOutcome::Grown { added } => {
            formatter.print_success(&format!("Slice {} grew by {} units", slice, added.len()))
        }
        AdjustOutcome::Shrunk { released } => {
            formatter.print_success(&format!("Slice {} shrank by {} units", slice, released.len()))
        }
        AdjustOutcome::Insufficient { reached, target, .. } => formatter.print_warning(&format!(
            "No more resources available: slice {} reached {} of {} units",
            slice, reached, target
        )),
    }
}
