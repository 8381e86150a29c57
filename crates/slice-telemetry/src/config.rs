//! Metrics window configuration

use crate::{Result, TelemetryError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where and how much telemetry to read per iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Directory of `<user_id>_metrics.csv` files
    pub dir: PathBuf,

    /// Length of the evaluated window
    pub window_seconds: u64,

    /// Rows the radio stack emits per second
    pub rows_per_second: u64,

    /// Shorter user ids are temporary identifiers and are ignored
    pub min_user_id_len: usize,
}

impl TelemetryConfig {
    pub fn validate(&self) -> Result<()> {
        match self.checked_window_rows() {
            Some(0) => Err(TelemetryError::Configuration(
                "Metrics window must cover at least one row".to_string(),
            )),
            None => Err(TelemetryError::Configuration(format!(
                "Metrics window of {}s at {} rows/s is too large",
                self.window_seconds, self.rows_per_second
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Trailing rows read from each user file
    pub fn window_rows(&self) -> usize {
        self.checked_window_rows().unwrap_or(usize::MAX)
    }

    fn checked_window_rows(&self) -> Option<usize> {
        let rows = self.window_seconds.checked_mul(self.rows_per_second)?;
        usize::try_from(rows).ok()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/root/radio_code/scope_config/metrics/csv"),
            window_seconds: 10,
            rows_per_second: 4,
            min_user_id_len: 10,
        }
    }
}
