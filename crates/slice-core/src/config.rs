//! Configuration management for sliced
//!
//! Provides the static slicing configuration (pool size, tenant count, record
//! locations) shared by the daemon and the CLI. Supports YAML/JSON files and
//! environment variable overrides.

use crate::{ResourcePool, Result, SliceId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest tenant count the radio stack supports
pub const MAX_TENANTS: usize = 10;

/// Static slicing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceConfig {
    /// Number of configured tenant slices
    pub tenants: usize,

    /// Resource pool partitioned among the slices
    pub pool: ResourcePool,

    /// Location of the persisted mask and policy records
    pub store: StoreConfig,
}

impl SliceConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (highest)
    /// 2. Configuration file
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var("SLICED_CONFIG") {
            builder = builder.add_source(config::File::with_name(&config_path).required(false));
        } else {
            for path in &["./sliced", "/etc/sliced/config"] {
                builder = builder.add_source(config::File::with_name(path).required(false));
            }
        }

        // SLICED__TENANTS=3, SLICED__POOL__SIZE=25, ...
        builder = builder.add_source(
            config::Environment::with_prefix("SLICED")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Validate the configuration. Failures here are fatal at startup.
    pub fn validate(&self) -> Result<()> {
        if self.tenants == 0 || self.tenants > MAX_TENANTS {
            return Err(crate::Error::config(format!(
                "Tenant count must be in 1..={}, got {}",
                MAX_TENANTS, self.tenants
            )));
        }

        self.pool.validate()?;

        if self.pool.limit < self.tenants {
            return Err(crate::Error::config(format!(
                "Pool of {} claimable units cannot serve {} tenants",
                self.pool.limit, self.tenants
            )));
        }

        self.store.validate()?;

        Ok(())
    }

    /// Slice IDs in ascending order
    pub fn slices(&self) -> impl Iterator<Item = SliceId> {
        0..self.tenants
    }
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            tenants: 2,
            pool: ResourcePool::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Location and naming of the persisted records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the mask and policy records
    pub dir: PathBuf,

    /// File name prefix of the per-slice mask records
    pub mask_prefix: String,

    /// File name of the policy record
    pub policy_file: String,

    /// Operate on the uplink masks instead of the downlink ones
    pub uplink: bool,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mask_prefix.is_empty() {
            return Err(crate::Error::config("Mask file prefix cannot be empty"));
        }
        if self.policy_file.is_empty() {
            return Err(crate::Error::config("Policy file name cannot be empty"));
        }
        Ok(())
    }

    /// Path of the mask record of a slice
    pub fn mask_path(&self, slice: SliceId) -> PathBuf {
        let prefix = if self.uplink {
            format!("ul_{}", self.mask_prefix)
        } else {
            self.mask_prefix.clone()
        };
        self.dir.join(format!("{}{}.txt", prefix, slice))
    }

    /// Path of the policy record
    pub fn policy_path(&self) -> PathBuf {
        self.dir.join(&self.policy_file)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/root/radio_code/scope_config/slicing"),
            mask_prefix: "slice_allocation_mask_tenant_".to_string(),
            policy_file: "slice_scheduling_policy.txt".to_string(),
            uplink: false,
        }
    }
}
