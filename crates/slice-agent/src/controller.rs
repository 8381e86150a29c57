//! Threshold controller
//!
//! Two fixed rules, evaluated once per iteration on the aggregated window:
//!
//! | slice | metric                     | thresholds            |
//! |-------|----------------------------|-----------------------|
//! | 0     | `dl_buffer [bytes]`        | `buffer_thresh_bytes` |
//! | 1     | `tx_brate downlink [Mbps]` | `thr_thresh_mbps`     |
//!
//! Above the upper threshold the slice claims its designated unit and, with
//! more than one user, switches to waterfilling. Below the lower threshold it
//! releases the unit and, with more than one user, returns to round-robin.
//! Between the thresholds nothing happens, which keeps a value oscillating
//! inside the band from flapping the records.

use crate::config::{HeuristicConfig, BUFFER_THRESHOLD_KEY, THROUGHPUT_THRESHOLD_KEY};
use chrono::{DateTime, Utc};
use serde::Serialize;
use slice_core::{
    MetricsSnapshot, ResourcePool, SliceId, SliceMask, SlicePolicies, SlicePolicy, SliceStore,
};
use slice_telemetry::{MetricsWindow, DL_BUFFER_BYTES, DL_THROUGHPUT_MBPS};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Slice evaluated on buffer occupancy
pub const BUFFER_SLICE: SliceId = 0;

/// Slice evaluated on downlink throughput
pub const THROUGHPUT_SLICE: SliceId = 1;

const DEFAULT_BUFFER_THRESHOLDS: Threshold = Threshold {
    lower: 1000.0,
    upper: 2000.0,
};

const DEFAULT_THROUGHPUT_THRESHOLDS: Threshold = Threshold {
    lower: 0.25,
    upper: 0.75,
};

/// Lower and upper bound of a hysteresis band
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    pub lower: f64,
    pub upper: f64,
}

impl Threshold {
    /// Read `[lower, upper]` from a config entry. Missing or malformed
    /// entries fall back to `default` with a warning.
    pub fn resolve(
        thresholds: &HashMap<String, serde_json::Value>,
        key: &str,
        default: Threshold,
    ) -> Threshold {
        let Some(value) = thresholds.get(key) else {
            warn!(key, lower = default.lower, upper = default.upper, "Threshold not configured, using default");
            return default;
        };

        let pair = value
            .as_array()
            .filter(|a| a.len() == 2)
            .and_then(|a| Some((a[0].as_f64()?, a[1].as_f64()?)));

        match pair {
            Some((lower, upper)) if lower.is_finite() && upper.is_finite() && lower <= upper => {
                Threshold { lower, upper }
            }
            _ => {
                warn!(key, value = %value, "Malformed threshold, using default");
                default
            }
        }
    }

    pub fn classify(&self, value: f64) -> Verdict {
        if value > self.upper {
            Verdict::Above
        } else if value < self.lower {
            Verdict::Below
        } else {
            Verdict::Within
        }
    }
}

/// Position of a value relative to its band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Above,
    Below,
    Within,
}

/// Why a rule was not evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The slice is not configured
    NotConfigured,

    /// No users attached in the window
    NoUsers,

    /// The slice's users did not report the metric
    MissingMetric,
}

/// What happened to the designated unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MaskChange {
    Unchanged,
    Claimed { index: usize },
    Released { index: usize },
    /// Designated unit lies outside the pool
    OutOfPool { index: usize },
    /// Designated unit belongs to another slice
    Contested { index: usize, owner: SliceId },
    /// The new mask could not be persisted
    WriteFailed { index: usize },
}

/// A scheduling policy switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyChange {
    pub from: SlicePolicy,
    pub to: SlicePolicy,
}

/// Result of evaluating one rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DecisionOutcome {
    Skipped {
        reason: SkipReason,
    },
    Evaluated {
        value: f64,
        threshold: Threshold,
        verdict: Verdict,
        mask: MaskChange,
        policy: Option<PolicyChange>,
    },
}

/// Decision for one slice
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceDecision {
    pub slice: SliceId,
    pub metric: String,
    pub user_count: usize,
    pub outcome: DecisionOutcome,
}

/// Outcome of one controller iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationReport {
    pub round: u64,
    pub timestamp: DateTime<Utc>,
    pub decisions: Vec<SliceDecision>,
    pub masks_written: Vec<SliceId>,
    pub policies_written: bool,
    pub errors: Vec<String>,
}

impl IterationReport {
    pub fn new(round: u64) -> Self {
        Self {
            round,
            timestamp: Utc::now(),
            decisions: Vec::new(),
            masks_written: Vec::new(),
            policies_written: false,
            errors: Vec::new(),
        }
    }

    /// Whether any record was rewritten
    pub fn changed(&self) -> bool {
        !self.masks_written.is_empty() || self.policies_written
    }

    /// Record a failure as `"<context> [<category>]: <error>"`
    pub fn record_error(&mut self, context: &str, err: &slice_core::Error) {
        self.errors
            .push(format!("{} [{}]: {}", context, err.category(), err));
    }
}

struct Rule {
    slice: SliceId,
    metric: &'static str,
    threshold: Threshold,
    free_index: usize,
}

/// Threshold controller over a slice store
#[derive(Debug)]
pub struct HeuristicController<S> {
    store: S,
    pool: ResourcePool,
    tenants: usize,
    buffer: Threshold,
    throughput: Threshold,
    buffer_free_index: usize,
    throughput_free_index: usize,
    round: u64,
}

impl<S: SliceStore> HeuristicController<S> {
    pub fn new(store: S, pool: ResourcePool, tenants: usize, config: &HeuristicConfig) -> Self {
        let buffer = Threshold::resolve(&config.thresholds, BUFFER_THRESHOLD_KEY, DEFAULT_BUFFER_THRESHOLDS);
        let throughput = Threshold::resolve(
            &config.thresholds,
            THROUGHPUT_THRESHOLD_KEY,
            DEFAULT_THROUGHPUT_THRESHOLDS,
        );

        info!(
            buffer_lower = buffer.lower,
            buffer_upper = buffer.upper,
            throughput_lower = throughput.lower,
            throughput_upper = throughput.upper,
            "Heuristic thresholds"
        );

        Self {
            store,
            pool,
            tenants,
            buffer,
            throughput,
            buffer_free_index: config.buffer_free_index,
            throughput_free_index: config.throughput_free_index,
            round: 0,
        }
    }

    /// Aggregate a metrics window and evaluate it
    pub fn step(&mut self, window: &MetricsWindow) -> IterationReport {
        let snapshot = window.aggregate();
        debug!(slices = snapshot.len(), users = window.users.len(), "Aggregated metrics window");
        self.evaluate(&snapshot)
    }

    /// Run one iteration on an aggregated snapshot.
    ///
    /// Masks and policies are re-read from the store first. A slice mask is
    /// written only when it changed; the policy record only when any policy
    /// changed. A failed write is logged and reported; the rest of the
    /// iteration still runs.
    pub fn evaluate(&mut self, snapshot: &MetricsSnapshot) -> IterationReport {
        let mut report = IterationReport::new(self.round);
        self.round += 1;
        info!(round = report.round, "Starting round");

        let mut masks = match self.store.read_masks(self.tenants) {
            Ok(masks) => masks,
            Err(e) => {
                error!(category = e.category(), error = %e, "Failed to read slice masks, skipping round");
                report.record_error("reading masks", &e);
                return report;
            }
        };

        let mut policies = match self.store.read_policies() {
            Ok(policies) => Some(policies),
            Err(e) => {
                error!(
                    category = e.category(),
                    error = %e,
                    "Failed to read scheduling policies, leaving them untouched"
                );
                report.record_error("reading policies", &e);
                None
            }
        };
        let mut policies_dirty = false;

        for rule in self.rules() {
            let decision = self.apply_rule(&rule, snapshot, &mut masks, policies.as_mut(), &mut report);
            if let DecisionOutcome::Evaluated { policy: Some(_), .. } = decision.outcome {
                policies_dirty = true;
            }
            report.decisions.push(decision);
        }

        if let (true, Some(policies)) = (policies_dirty, policies.as_ref()) {
            match self.store.write_policies(policies) {
                Ok(()) => {
                    info!(round = report.round, "Scheduling policies written");
                    report.policies_written = true;
                }
                Err(e) => {
                    error!(
                        category = e.category(),
                        transient = e.is_transient(),
                        error = %e,
                        "Failed to write scheduling policies"
                    );
                    report.record_error("writing policies", &e);
                }
            }
        }

        report
    }

    fn rules(&self) -> [Rule; 2] {
        [
            Rule {
                slice: BUFFER_SLICE,
                metric: DL_BUFFER_BYTES,
                threshold: self.buffer,
                free_index: self.buffer_free_index,
            },
            Rule {
                slice: THROUGHPUT_SLICE,
                metric: DL_THROUGHPUT_MBPS,
                threshold: self.throughput,
                free_index: self.throughput_free_index,
            },
        ]
    }

    fn apply_rule(
        &mut self,
        rule: &Rule,
        snapshot: &MetricsSnapshot,
        masks: &mut [SliceMask],
        policies: Option<&mut SlicePolicies>,
        report: &mut IterationReport,
    ) -> SliceDecision {
        let sample = snapshot.get(&rule.slice);
        let user_count = sample.map_or(0, |s| s.user_count);
        let mut decision = SliceDecision {
            slice: rule.slice,
            metric: rule.metric.to_string(),
            user_count,
            outcome: DecisionOutcome::Skipped {
                reason: SkipReason::NoUsers,
            },
        };

        if rule.slice >= self.tenants {
            debug!(slice = rule.slice, "Slice not configured, rule skipped");
            decision.outcome = DecisionOutcome::Skipped {
                reason: SkipReason::NotConfigured,
            };
            return decision;
        }

        let Some(sample) = sample.filter(|s| s.user_count > 0) else {
            debug!(slice = rule.slice, "No users in slice");
            return decision;
        };

        let Some(value) = sample.average(rule.metric) else {
            debug!(slice = rule.slice, metric = rule.metric, "Metric not reported");
            decision.outcome = DecisionOutcome::Skipped {
                reason: SkipReason::MissingMetric,
            };
            return decision;
        };

        let verdict = rule.threshold.classify(value);
        info!(
            slice = rule.slice,
            metric = rule.metric,
            value,
            users = user_count,
            verdict = ?verdict,
            "Evaluated slice"
        );

        let (mask, target_policy) = match verdict {
            Verdict::Above => (
                self.claim(rule.slice, rule.free_index, masks, report),
                SlicePolicy::Waterfilling,
            ),
            Verdict::Below => (
                self.release(rule.slice, rule.free_index, masks, report),
                SlicePolicy::RoundRobin,
            ),
            Verdict::Within => {
                decision.outcome = DecisionOutcome::Evaluated {
                    value,
                    threshold: rule.threshold,
                    verdict,
                    mask: MaskChange::Unchanged,
                    policy: None,
                };
                return decision;
            }
        };

        // a single user gains nothing from a different scheduler
        let policy = match policies {
            Some(policies) if user_count > 1 => {
                let current = policies.get(rule.slice).unwrap_or(SlicePolicy::RoundRobin);
                if current != target_policy && policies.set(rule.slice, target_policy) {
                    info!(slice = rule.slice, from = %current, to = %target_policy, "Switching scheduling policy");
                    Some(PolicyChange {
                        from: current,
                        to: target_policy,
                    })
                } else {
                    None
                }
            }
            _ => None,
        };

        decision.outcome = DecisionOutcome::Evaluated {
            value,
            threshold: rule.threshold,
            verdict,
            mask,
            policy,
        };
        decision
    }

    fn claim(
        &mut self,
        slice: SliceId,
        index: usize,
        masks: &mut [SliceMask],
        report: &mut IterationReport,
    ) -> MaskChange {
        if index >= self.pool.limit {
            warn!(slice, index, limit = self.pool.limit, "Designated unit outside the pool");
            return MaskChange::OutOfPool { index };
        }
        if masks[slice].is_set(index) {
            return MaskChange::Unchanged;
        }
        if let Some(owner) = masks.iter().position(|m| m.is_set(index)) {
            warn!(slice, index, owner, "Designated unit belongs to another slice, not claiming");
            return MaskChange::Contested { index, owner };
        }

        let mut mask = masks[slice].clone();
        if let Err(e) = mask.set(index) {
            warn!(slice, index, error = %e, "Cannot set designated unit");
            return MaskChange::OutOfPool { index };
        }

        if self.persist_mask(slice, &mask, report) {
            info!(slice, index, "Claimed designated unit");
            masks[slice] = mask;
            MaskChange::Claimed { index }
        } else {
            MaskChange::WriteFailed { index }
        }
    }

    fn release(
        &mut self,
        slice: SliceId,
        index: usize,
        masks: &mut [SliceMask],
        report: &mut IterationReport,
    ) -> MaskChange {
        if index >= self.pool.limit {
            warn!(slice, index, limit = self.pool.limit, "Designated unit outside the pool");
            return MaskChange::OutOfPool { index };
        }
        if !masks[slice].is_set(index) {
            return MaskChange::Unchanged;
        }

        let mut mask = masks[slice].clone();
        if let Err(e) = mask.clear(index) {
            warn!(slice, index, error = %e, "Cannot clear designated unit");
            return MaskChange::OutOfPool { index };
        }

        if self.persist_mask(slice, &mask, report) {
            info!(slice, index, "Released designated unit");
            masks[slice] = mask;
            MaskChange::Released { index }
        } else {
            MaskChange::WriteFailed { index }
        }
    }

    fn persist_mask(&mut self, slice: SliceId, mask: &SliceMask, report: &mut IterationReport) -> bool {
        match self.store.write_mask(slice, mask) {
            Ok(()) => {
                info!(slice, mask = %mask, "Slicing mask written");
                report.masks_written.push(slice);
                true
            }
            Err(e) => {
                error!(
                    slice,
                    category = e.category(),
                    transient = e.is_transient(),
                    error = %e,
                    "Failed to write slicing mask"
                );
                report.record_error(&format!("writing mask of slice {}", slice), &e);
                false
            }
        }
    }

    /// Iterations run so far
    pub fn rounds(&self) -> u64 {
        self.round
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
