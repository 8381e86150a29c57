//! # slice-agent
//!
//! Slicing controller daemon (sliced).
//!
//! This crate runs the periodic control loop that reads the per-user metrics
//! window, evaluates the threshold rules (or cycles through fixed range
//! allocations) and persists the resulting slice masks and scheduling
//! policies for the radio stack to pick up.

pub mod agent;
pub mod config;
pub mod controller;
pub mod rotation;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder};
pub use config::{AgentConfig, ControllerMode, HeuristicConfig, LoggingConfig, RotationConfig};
pub use controller::{HeuristicController, IterationReport};
pub use rotation::RotationController;

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] slice_core::Error),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] slice_telemetry::TelemetryError),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Initialize logging and tracing. `RUST_LOG` overrides the configured level.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let installed = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    installed.map_err(|e| AgentError::Config(format!("Failed to initialize logging: {}", e)))
}
