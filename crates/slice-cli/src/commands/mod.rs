//! Command implementations for slicectl

pub mod alloc;
pub mod policy;
pub mod relative;
pub mod show;

use crate::output::{colorize_policy, format_runs, Formattable};
use serde::Serialize;
use slice_core::{Result, SliceId, SliceMask, SlicePolicies, SlicePolicy, SliceStore};
use std::collections::BTreeMap;

/// One slice as shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceView {
    pub slice: SliceId,
    pub policy: Option<SlicePolicy>,
    pub units: usize,
    pub runs: String,
    pub mask: SliceMask,
}

impl SliceView {
    pub fn new(slice: SliceId, mask: SliceMask, policy: Option<SlicePolicy>) -> Self {
        Self {
            slice,
            policy,
            units: mask.count(),
            runs: format_runs(&mask),
            mask,
        }
    }
}

impl Formattable for SliceView {
    fn table_headers() -> Vec<String> {
        ["Slice", "Policy", "Units", "Runs", "Mask"]
            .iter()
            .map(|h| h.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.slice.to_string(),
            colorize_policy(self.policy).to_string(),
            self.units.to_string(),
            self.runs.clone(),
            self.mask.to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Slice".to_string(), self.slice.to_string()),
            ("Policy".to_string(), colorize_policy(self.policy).to_string()),
            ("Units".to_string(), self.units.to_string()),
            ("Runs".to_string(), self.runs.clone()),
            ("Mask".to_string(), self.mask.to_string()),
        ]
    }
}

/// Views of the given masks, annotated with the persisted policies
pub fn views<S: SliceStore>(store: &S, masks: &BTreeMap<SliceId, SliceMask>) -> Result<Vec<SliceView>> {
    let policies = store.read_policies()?;
    Ok(masks
        .iter()
        .map(|(slice, mask)| SliceView::new(*slice, mask.clone(), policies.get(*slice)))
        .collect())
}

/// Views of every configured slice
pub fn all_views<S: SliceStore>(store: &S, tenants: usize) -> Result<Vec<SliceView>> {
    let masks: BTreeMap<SliceId, SliceMask> = store.read_masks(tenants)?.into_iter().enumerate().collect();
    views(store, &masks)
}

/// Set one policy and persist the record if it changed. Returns the previous
/// policy when a write happened.
pub fn update_policy<S: SliceStore>(
    store: &mut S,
    slice: SliceId,
    policy: SlicePolicy,
) -> Result<Option<SlicePolicy>> {
    let mut policies: SlicePolicies = store.read_policies()?;
    let previous = policies.get(slice).unwrap_or(SlicePolicy::RoundRobin);
    if !policies.set(slice, policy) {
        return Ok(None);
    }
    store.write_policies(&policies)?;
    Ok(Some(previous))
}
