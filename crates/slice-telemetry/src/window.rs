//! Metrics windows and per-slice aggregation

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slice_core::{MetricsSnapshot, SliceId, SliceMetricsSample};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Samples of one user over the window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,

    /// Slice the user was attached to at the start of the window
    pub slice: SliceId,

    /// Metric name -> samples, oldest first
    pub samples: BTreeMap<String, Vec<f64>>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>, slice: SliceId) -> Self {
        Self {
            user_id: user_id.into(),
            slice,
            samples: BTreeMap::new(),
        }
    }

    pub fn with_samples(mut self, metric: impl Into<String>, values: impl IntoIterator<Item = f64>) -> Self {
        self.samples.entry(metric.into()).or_default().extend(values);
        self
    }

    pub fn push(&mut self, metric: &str, value: f64) {
        match self.samples.get_mut(metric) {
            Some(values) => values.push(value),
            None => {
                self.samples.insert(metric.to_string(), vec![value]);
            }
        }
    }

    /// Mean of a metric over the window, `None` without samples
    pub fn mean(&self, metric: &str) -> Option<f64> {
        let values = self.samples.get(metric)?;
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Per-user samples collected for one controller iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsWindow {
    pub collected_at: DateTime<Utc>,
    pub users: Vec<UserRecord>,
}

impl MetricsWindow {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self {
            collected_at: Utc::now(),
            users,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Reduce the window to one sample per slice.
    ///
    /// Each user's samples are first averaged per metric; a slice's value is
    /// the mean of its users' averages. A metric none of a slice's users
    /// reported is absent from that slice's sample. Slices without users do
    /// not appear.
    pub fn aggregate(&self) -> MetricsSnapshot {
        let mut by_slice: BTreeMap<SliceId, Vec<&UserRecord>> = BTreeMap::new();
        for user in &self.users {
            by_slice.entry(user.slice).or_default().push(user);
        }

        by_slice
            .into_iter()
            .map(|(slice, users)| {
                let metrics: BTreeSet<&str> = users
                    .iter()
                    .flat_map(|u| u.samples.keys().map(String::as_str))
                    .collect();

                let mut sample = SliceMetricsSample::new(users.len());
                for metric in metrics {
                    let means: Vec<f64> = users.iter().filter_map(|u| u.mean(metric)).collect();
                    if !means.is_empty() {
                        let mean = means.iter().sum::<f64>() / means.len() as f64;
                        sample = sample.with_average(metric, mean);
                    }
                }

                (slice, sample)
            })
            .collect()
    }
}

/// Source of metrics windows
pub trait MetricsSource {
    /// Collect the current window. An empty window means no data.
    fn collect(&mut self) -> Result<MetricsWindow>;
}

/// Replays prepared windows, then reports no data
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    windows: VecDeque<MetricsWindow>,
}

impl MemorySource {
    pub fn new(windows: impl IntoIterator<Item = MetricsWindow>) -> Self {
        Self {
            windows: windows.into_iter().collect(),
        }
    }

    pub fn push(&mut self, window: MetricsWindow) {
        self.windows.push_back(window);
    }

    pub fn remaining(&self) -> usize {
        self.windows.len()
    }
}

impl MetricsSource for MemorySource {
    fn collect(&mut self) -> Result<MetricsWindow> {
        Ok(self.windows.pop_front().unwrap_or_else(MetricsWindow::empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DL_BUFFER_BYTES, DL_THROUGHPUT_MBPS};

    #[test]
    fn test_user_mean() {
        let user = UserRecord::new("001010123456789", 0).with_samples(DL_BUFFER_BYTES, [1000.0, 2000.0, 3000.0]);
        assert_eq!(user.mean(DL_BUFFER_BYTES), Some(2000.0));
        assert_eq!(user.mean(DL_THROUGHPUT_MBPS), None);
    }

    #[test]
    fn test_slice_mean_is_mean_of_user_means() {
        // user a: mean 1000 over 4 samples, user b: mean 4000 over 1 sample
        let window = MetricsWindow::new(vec![
            UserRecord::new("a", 0).with_samples(DL_BUFFER_BYTES, [500.0, 1500.0, 500.0, 1500.0]),
            UserRecord::new("b", 0).with_samples(DL_BUFFER_BYTES, [4000.0]),
            UserRecord::new("c", 1).with_samples(DL_THROUGHPUT_MBPS, [0.5, 1.5]),
        ]);

        let snapshot = window.aggregate();
        assert_eq!(snapshot.len(), 2);

        let slice0 = &snapshot[&0];
        assert_eq!(slice0.user_count, 2);
        assert_eq!(slice0.average(DL_BUFFER_BYTES), Some(2500.0));
        assert_eq!(slice0.average(DL_THROUGHPUT_MBPS), None);

        let slice1 = &snapshot[&1];
        assert_eq!(slice1.user_count, 1);
        assert_eq!(slice1.average(DL_THROUGHPUT_MBPS), Some(1.0));
    }

    #[test]
    fn test_users_without_metric_still_count() {
        let window = MetricsWindow::new(vec![
            UserRecord::new("a", 0).with_samples(DL_BUFFER_BYTES, [100.0]),
            UserRecord::new("b", 0),
        ]);

        let sample = &window.aggregate()[&0];
        assert_eq!(sample.user_count, 2);
        assert_eq!(sample.average(DL_BUFFER_BYTES), Some(100.0));
    }

    #[test]
    fn test_empty_window_aggregates_to_nothing() {
        assert!(MetricsWindow::empty().aggregate().is_empty());
    }

    #[test]
    fn test_memory_source_replays_then_runs_dry() {
        let mut source = MemorySource::new([MetricsWindow::new(vec![UserRecord::new("a", 1)])]);
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.collect().unwrap().users.len(), 1);
        assert!(source.collect().unwrap().is_empty());
    }
}
