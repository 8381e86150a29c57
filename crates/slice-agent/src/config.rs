//! Configuration management for the slicing daemon

use crate::{AgentError, Result};
use serde::{Deserialize, Serialize};
use slice_alloc::AllocationRequest;
use slice_core::{SliceConfig, SliceId, SliceRange};
use slice_telemetry::TelemetryConfig;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Threshold key for the buffer occupancy rule
pub const BUFFER_THRESHOLD_KEY: &str = "buffer_thresh_bytes";

/// Threshold key for the throughput rule
pub const THROUGHPUT_THRESHOLD_KEY: &str = "thr_thresh_mbps";

/// Complete configuration for the slicing daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Pool, tenants and record locations
    #[serde(flatten)]
    pub slicing: SliceConfig,

    /// Agent-specific configuration
    pub agent: AgentSpecificConfig,

    /// Metrics window input
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Threshold controller parameters
    #[serde(default)]
    pub heuristic: HeuristicConfig,

    /// Allocation cycle used in rotation mode
    #[serde(default)]
    pub rotation: RotationConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Agent-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpecificConfig {
    /// Agent name/identifier
    pub name: String,

    /// Seconds between controller iterations
    pub period_seconds: u64,

    /// Which controller drives the masks
    pub mode: ControllerMode,

    /// Allocation applied once at startup in heuristic mode
    #[serde(default)]
    pub initial_allocation: Option<AllocationRequest>,

    /// Keep records in memory instead of touching the record directory
    #[serde(default)]
    pub dry_run: bool,

    /// Stop after this many iterations
    #[serde(default)]
    pub max_rounds: Option<u64>,
}

/// Controller selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerMode {
    /// Threshold rules on the metrics window
    Heuristic,

    /// Cycle through fixed range allocations
    Rotation,
}

/// Threshold controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Threshold key -> `[lower, upper]`. Kept untyped so a malformed entry
    /// falls back to its default instead of rejecting the whole file.
    pub thresholds: HashMap<String, serde_json::Value>,

    /// Unit toggled by the buffer occupancy rule (slice 0)
    pub buffer_free_index: usize,

    /// Unit toggled by the throughput rule (slice 1)
    pub throughput_free_index: usize,
}

/// Rotation controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Range allocations applied in turn, the first one at startup
    pub allocations: Vec<BTreeMap<SliceId, SliceRange>>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            slicing: SliceConfig::default(),
            agent: AgentSpecificConfig::default(),
            telemetry: TelemetryConfig::default(),
            heuristic: HeuristicConfig::default(),
            rotation: RotationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AgentSpecificConfig {
    fn default() -> Self {
        Self {
            name: "sliced".to_string(),
            period_seconds: 60,
            mode: ControllerMode::Heuristic,
            initial_allocation: None,
            dry_run: false,
            max_rounds: None,
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        let thresholds = HashMap::from([
            (BUFFER_THRESHOLD_KEY.to_string(), serde_json::json!([1000.0, 2000.0])),
            (THROUGHPUT_THRESHOLD_KEY.to_string(), serde_json::json!([0.25, 0.75])),
        ]);

        Self {
            thresholds,
            buffer_free_index: 2,
            throughput_free_index: 5,
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            allocations: vec![
                BTreeMap::from([(0, SliceRange::new(0, 11)), (1, SliceRange::new(12, 23))]),
                BTreeMap::from([(0, SliceRange::new(0, 5)), (1, SliceRange::new(6, 23))]),
                BTreeMap::from([(0, SliceRange::new(0, 17)), (1, SliceRange::new(18, 23))]),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Defaults for everything but the slicing section, which is loaded from
    /// the standard locations and `SLICED__*` environment variables
    pub fn from_environment() -> Result<Self> {
        Ok(Self {
            slicing: SliceConfig::load()?,
            ..Default::default()
        })
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| AgentError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration. Errors here abort startup.
    pub fn validate(&self) -> Result<()> {
        self.slicing.validate()?;
        self.telemetry.validate()?;

        if self.agent.name.is_empty() {
            return Err(AgentError::Config("Agent name cannot be empty".to_string()));
        }

        if self.agent.period_seconds == 0 {
            return Err(AgentError::Config("Iteration period must be greater than 0".to_string()));
        }

        if self.agent.mode == ControllerMode::Rotation && self.rotation.allocations.is_empty() {
            return Err(AgentError::Config(
                "Rotation mode needs at least one allocation".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(AgentError::Config(format!("Invalid log level: {}", self.logging.level))),
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => return Err(AgentError::Config(format!("Invalid log format: {}", self.logging.format))),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.agent.name, "sliced");
        assert_eq!(config.agent.period_seconds, 60);
        assert_eq!(config.agent.mode, ControllerMode::Heuristic);
        assert_eq!(config.heuristic.buffer_free_index, 2);
        assert_eq!(config.heuristic.throughput_free_index, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_agent_config_validation() {
        let mut config = AgentConfig::default();

        config.agent.period_seconds = 0;
        assert!(config.validate().is_err());

        config.agent.period_seconds = 60;
        config.slicing.tenants = 11;
        assert!(matches!(config.validate(), Err(AgentError::Core(_))));

        config.slicing.tenants = 2;
        config.agent.mode = ControllerMode::Rotation;
        config.rotation.allocations.clear();
        assert!(config.validate().is_err());

        config.agent.mode = ControllerMode::Heuristic;
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sliced.yaml");

        let mut config = AgentConfig::default();
        config.agent.initial_allocation = Some(AllocationRequest::Equal);
        config.to_file(&config_path).unwrap();

        let loaded = AgentConfig::from_file(&config_path).unwrap();
        assert_eq!(loaded.agent.name, config.agent.name);
        assert_eq!(loaded.slicing, config.slicing);
        assert_eq!(loaded.rotation, config.rotation);
        assert_eq!(loaded.agent.initial_allocation, Some(AllocationRequest::Equal));
        assert_eq!(loaded.heuristic.thresholds.len(), 2);
    }

    #[test]
    fn test_minimal_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sliced.yaml");
        std::fs::write(
            &config_path,
            r#"
tenants: 3
pool:
  size: 25
  limit: 25
store:
  dir: /tmp/slicing
  mask_prefix: slice_allocation_mask_tenant_
  policy_file: slice_scheduling_policy.txt
  uplink: false
agent:
  name: test
  period_seconds: 30
  mode: rotation
logging:
  level: debug
  format: json
  show_target: false
  show_thread_ids: false
  show_line_numbers: true
"#,
        )
        .unwrap();

        let config = AgentConfig::from_file(&config_path).unwrap();
        assert_eq!(config.slicing.tenants, 3);
        assert_eq!(config.agent.mode, ControllerMode::Rotation);
        assert_eq!(config.telemetry, TelemetryConfig::default());
        assert_eq!(config.rotation, RotationConfig::default());
        config.validate().unwrap();
    }
}
