//! # slice-telemetry
//!
//! Collects the per-user metrics window the controller evaluates and reduces
//! it to one [`slice_core::SliceMetricsSample`] per slice.
//!
//! This crate provides:
//! - [`MetricsWindow`] and its per-slice aggregation
//! - The [`MetricsSource`] trait
//! - [`CsvMetricsSource`], reading the per-user CSV files written by the
//!   radio stack
//! - [`MemorySource`], replaying prepared windows

use thiserror::Error;

pub mod config;
pub mod csv;
pub mod window;

pub use config::TelemetryConfig;
pub use csv::CsvMetricsSource;
pub use window::{MemorySource, MetricsSource, MetricsWindow, UserRecord};

/// Downlink buffer occupancy column
pub const DL_BUFFER_BYTES: &str = "dl_buffer [bytes]";

/// Downlink throughput column
pub const DL_THROUGHPUT_MBPS: &str = "tx_brate downlink [Mbps]";

/// Column carrying the slice a user is attached to
pub const SLICE_ID_COLUMN: &str = "slice_id";

/// Column carrying the sample timestamp
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Result type for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors that can occur while collecting metrics
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metrics directory unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed metrics file: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] slice_core::Error),
}

impl TelemetryError {
    /// Whether the next collection may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemetryError::Unavailable(_) | TelemetryError::Malformed(_) | TelemetryError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_error_properties() {
        let unavailable = TelemetryError::Unavailable("/tmp/metrics".to_string());
        assert!(unavailable.is_retryable());

        let config_error = TelemetryError::Configuration("window".to_string());
        assert!(!config_error.is_retryable());
        assert_eq!(config_error.to_string(), "Configuration error: window");
    }
}
