//! Scheduling policy commands

use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{bail, Result};
use slice_core::{SliceConfig, SliceId, SlicePolicy, SliceStore};

/// Parse `slice=policy`, e.g. `1=wf` or `0=round-robin`
pub fn parse_policy_assignment(s: &str) -> std::result::Result<(SliceId, SlicePolicy), String> {
    let (slice, policy) = s
        .split_once('=')
        .ok_or_else(|| format!("expected SLICE=POLICY, got '{}'", s))?;
    let slice: SliceId = slice
        .trim()
        .parse()
        .map_err(|_| format!("invalid slice id '{}'", slice.trim()))?;
    let policy: SlicePolicy = policy.trim().parse().map_err(|e| format!("{}", e))?;
    Ok((slice, policy))
}

/// Apply policy assignments; the record is written once, only if something
/// changed. Returns whether it was written.
pub fn set_policies<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    assignments: &[(SliceId, SlicePolicy)],
) -> Result<bool> {
    if let Some((slice, _)) = assignments.iter().find(|(slice, _)| *slice >= config.tenants) {
        bail!("Slice {} is not configured ({} tenants)", slice, config.tenants);
    }

    let mut policies = store.read_policies()?;
    let mut changed = false;
    for (slice, policy) in assignments {
        changed |= policies.set(*slice, *policy);
    }

    if changed {
        store.write_policies(&policies)?;
    }
    Ok(changed)
}

/// Handle `slicectl set-policy`
pub fn handle_set_policy<S: SliceStore>(
    store: &mut S,
    config: &SliceConfig,
    assignments: Vec<(SliceId, SlicePolicy)>,
    output: OutputFormat,
) -> Result<()> {
    let formatter = OutputFormatter::new(output);

    if set_policies(store, config, &assignments)? {
        formatter.print_success("Scheduling policies written")
    } else {
        formatter.print_info("Scheduling policies already up to date")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slice_core::SlicePolicies;
    use slice_store::MemoryStore;

    #[test]
    fn test_parse_policy_assignment() {
        assert_eq!(parse_policy_assignment("1=wf").unwrap(), (1, SlicePolicy::Waterfilling));
        assert_eq!(parse_policy_assignment("0=2").unwrap(), (0, SlicePolicy::Proportional));
        assert!(parse_policy_assignment("0=fastest").is_err());
        assert!(parse_policy_assignment("wf").is_err());
    }

    #[test]
    fn test_set_policies_writes_once() {
        let config = SliceConfig::default();
        let mut store = MemoryStore::new(25).with_policies(SlicePolicies::uniform(2, SlicePolicy::RoundRobin));

        let assignments = [(0, SlicePolicy::Waterfilling), (1, SlicePolicy::Proportional)];
        assert!(set_policies(&mut store, &config, &assignments).unwrap());
        assert_eq!(store.policy_writes(), 1);

        assert!(!set_policies(&mut store, &config, &assignments).unwrap());
        assert_eq!(store.policy_writes(), 1);

        assert!(set_policies(&mut store, &config, &[(7, SlicePolicy::RoundRobin)]).is_err());
    }
}
