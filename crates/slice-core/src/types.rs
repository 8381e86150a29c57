//! Core type definitions for sliced

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Index of a tenant slice, in `[0, tenants)`
pub type SliceId = usize;

/// Per-slice aggregated metrics for one observation window
pub type MetricsSnapshot = BTreeMap<SliceId, SliceMetricsSample>;

/// The fixed pool of resource block groups shared by all slices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    /// Total number of RBGs the radio stack expects in every mask
    pub size: usize,

    /// Usable bound: no index at or above it is ever claimed by the allocator
    pub limit: usize,
}

impl ResourcePool {
    /// Create a pool where every unit is usable
    pub fn new(size: usize) -> Self {
        Self { size, limit: size }
    }

    /// Restrict the claimable indices to `[0, limit)`
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("Resource pool size must be > 0"));
        }
        if self.limit > self.size {
            return Err(Error::config(format!(
                "Resource pool limit {} exceeds pool size {}",
                self.limit, self.size
            )));
        }
        Ok(())
    }

    /// An all-zero mask sized for this pool
    pub fn empty_mask(&self) -> SliceMask {
        SliceMask::new(self.size)
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(25)
    }
}

/// Bit vector over the resource pool; a set bit means the unit is claimed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SliceMask(Vec<bool>);

impl SliceMask {
    /// Create an unassigned mask of the given width
    pub fn new(width: usize) -> Self {
        Self(vec![false; width])
    }

    /// Create a mask with the given indices set
    pub fn from_indices(width: usize, indices: impl IntoIterator<Item = usize>) -> Result<Self> {
        let mut mask = Self::new(width);
        for idx in indices {
            mask.set(idx)?;
        }
        Ok(mask)
    }

    /// Number of units covered by the mask
    pub fn width(&self) -> usize {
        self.0.len()
    }

    /// Number of claimed units
    pub fn count(&self) -> usize {
        self.0.iter().filter(|bit| **bit).count()
    }

    /// True when no unit is claimed
    pub fn is_unassigned(&self) -> bool {
        !self.0.iter().any(|bit| *bit)
    }

    pub fn is_set(&self, idx: usize) -> bool {
        self.0.get(idx).copied().unwrap_or(false)
    }

    /// Claim a unit. Returns whether the mask changed.
    pub fn set(&mut self, idx: usize) -> Result<bool> {
        self.assign(idx, true)
    }

    /// Release a unit. Returns whether the mask changed.
    pub fn clear(&mut self, idx: usize) -> Result<bool> {
        self.assign(idx, false)
    }

    fn assign(&mut self, idx: usize, value: bool) -> Result<bool> {
        let width = self.width();
        let bit = self.0.get_mut(idx).ok_or_else(|| {
            Error::invalid_mask(format!("index {} outside mask of width {}", idx, width))
        })?;
        let changed = *bit != value;
        *bit = value;
        Ok(changed)
    }

    /// Claimed indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(idx, bit)| bit.then_some(idx))
    }

    /// Lowest claimed index
    pub fn first_index(&self) -> Option<usize> {
        self.indices().next()
    }

    /// Highest claimed index
    pub fn last_index(&self) -> Option<usize> {
        self.0.iter().rposition(|bit| *bit)
    }

    /// Claim every unit claimed by `other` (bitwise OR over the common width)
    pub fn merge(&mut self, other: &SliceMask) {
        for (bit, other_bit) in self.0.iter_mut().zip(other.0.iter()) {
            *bit |= *other_bit;
        }
    }

    /// Indices claimed by both masks
    pub fn overlap(&self, other: &SliceMask) -> Vec<usize> {
        self.indices().filter(|idx| other.is_set(*idx)).collect()
    }

    /// Copy of this mask padded with zeros or truncated to `width`
    pub fn resized(&self, width: usize) -> SliceMask {
        let mut bits = self.0.clone();
        bits.resize(width, false);
        SliceMask(bits)
    }
}

impl fmt::Display for SliceMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.0 {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl FromStr for SliceMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .chars()
            .enumerate()
            .map(|(idx, c)| match c {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(Error::invalid_mask(format!(
                    "unexpected character {:?} at position {}",
                    other, idx
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(SliceMask)
    }
}

impl TryFrom<String> for SliceMask {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SliceMask> for String {
    fn from(mask: SliceMask) -> Self {
        mask.to_string()
    }
}

/// Scheduling discipline applied to the users of a slice by the radio stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlicePolicy {
    RoundRobin,
    Waterfilling,
    Proportional,
}

impl SlicePolicy {
    /// Integer code used in the persisted policy record
    pub fn code(&self) -> u8 {
        match self {
            SlicePolicy::RoundRobin => 0,
            SlicePolicy::Waterfilling => 1,
            SlicePolicy::Proportional => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(SlicePolicy::RoundRobin),
            1 => Ok(SlicePolicy::Waterfilling),
            2 => Ok(SlicePolicy::Proportional),
            other => Err(Error::invalid_policy(format!("unknown policy code {}", other))),
        }
    }
}

impl fmt::Display for SlicePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SlicePolicy::RoundRobin => "round-robin",
            SlicePolicy::Waterfilling => "waterfilling",
            SlicePolicy::Proportional => "proportional",
        };
        f.write_str(name)
    }
}

impl FromStr for SlicePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "0" | "rr" | "round-robin" | "round_robin" => Ok(SlicePolicy::RoundRobin),
            "1" | "wf" | "waterfilling" => Ok(SlicePolicy::Waterfilling),
            "2" | "pf" | "proportional" => Ok(SlicePolicy::Proportional),
            other => Err(Error::invalid_policy(format!("unknown policy {:?}", other))),
        }
    }
}

/// Scheduling policy of every slice, ordered by slice index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlicePolicies(BTreeMap<SliceId, SlicePolicy>);

impl SlicePolicies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every slice in `[0, tenants)` running the same policy
    pub fn uniform(tenants: usize, policy: SlicePolicy) -> Self {
        Self((0..tenants).map(|slice| (slice, policy)).collect())
    }

    pub fn get(&self, slice: SliceId) -> Option<SlicePolicy> {
        self.0.get(&slice).copied()
    }

    /// Set the policy of a slice. Returns whether the stored value changed.
    pub fn set(&mut self, slice: SliceId, policy: SlicePolicy) -> bool {
        self.0.insert(slice, policy) != Some(policy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SliceId, SlicePolicy)> + '_ {
        self.0.iter().map(|(slice, policy)| (*slice, *policy))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(SliceId, SlicePolicy)> for SlicePolicies {
    fn from_iter<I: IntoIterator<Item = (SliceId, SlicePolicy)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Inclusive range of unit indices requested for a slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRange {
    pub min: i64,
    pub max: i64,
}

impl SliceRange {
    /// Sentinel meaning "no allocation requested"
    pub const NONE: SliceRange = SliceRange { min: -1, max: -1 };

    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Whether the unit index falls inside the range. Ranges with a negative
    /// bound contain nothing.
    pub fn contains(&self, idx: usize) -> bool {
        if self.min < 0 || self.max < 0 {
            return false;
        }
        let idx = idx as i64;
        idx >= self.min && idx <= self.max
    }
}

impl fmt::Display for SliceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

impl FromStr for SliceRange {
    type Err = Error;

    /// Parses `"min-max"`, a single index, or `"none"`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(Self::NONE);
        }
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|e| Error::invalid_request(format!("invalid range {:?}: {}", s, e)))
        };
        match s.split_once('-') {
            Some((min, max)) => Ok(Self::new(parse(min)?, parse(max)?)),
            None => {
                let idx = parse(s)?;
                Ok(Self::new(idx, idx))
            }
        }
    }
}

/// Aggregated metrics of one slice over an observation window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SliceMetricsSample {
    /// Number of users attached to the slice during the window
    pub user_count: usize,

    /// Metric name to mean value across the slice's users
    pub averages: BTreeMap<String, f64>,
}

impl SliceMetricsSample {
    pub fn new(user_count: usize) -> Self {
        Self {
            user_count,
            averages: BTreeMap::new(),
        }
    }

    pub fn with_average(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.averages.insert(metric.into(), value);
        self
    }

    pub fn average(&self, metric: &str) -> Option<f64> {
        self.averages.get(metric).copied()
    }
}
