//! slicectl - Operator CLI for slice masks and scheduling policies

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use slice_core::{SliceConfig, SliceId, SliceMask, SlicePolicy, SliceRange};
use slice_store::FileStore;
use std::path::PathBuf;
use tracing::debug;

mod commands;
mod output;

use commands::{alloc, policy, relative, show};
use output::OutputFormat;

/// Operator CLI for slice masks and scheduling policies
#[derive(Debug, Parser)]
#[command(name = "slicectl")]
#[command(about = "Inspect and change slice masks and scheduling policies")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Record directory (overrides the configuration)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Number of tenant slices (overrides the configuration)
    #[arg(short, long)]
    tenants: Option<usize>,

    /// Operate on the uplink masks
    #[arg(long)]
    uplink: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    /// Enable JSON output (overrides --output)
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Split the pool evenly among all slices
    Equal,

    /// Assign explicit inclusive unit ranges; unlisted slices get none
    Range {
        /// Assignments as SLICE=MIN-MAX (or SLICE=none)
        #[arg(required = true, value_parser = alloc::parse_range_assignment)]
        ranges: Vec<(SliceId, SliceRange)>,
    },

    /// Write a mask verbatim for one slice
    #[command(name = "set-mask")]
    SetMask {
        /// Slice identifier
        slice: SliceId,

        /// Mask as a string of 0/1 characters, one per unit
        mask: SliceMask,
    },

    /// Grow or shrink one slice to a unit count
    Relative {
        /// Slice identifier
        slice: SliceId,

        /// Target number of units
        units: usize,

        /// Also set the slice's scheduling policy (rr, wf, pf)
        #[arg(short, long)]
        policy: Option<SlicePolicy>,
    },

    /// Set scheduling policies
    #[command(name = "set-policy")]
    SetPolicy {
        /// Assignments as SLICE=POLICY (rr, wf, pf)
        #[arg(required = true, value_parser = policy::parse_policy_assignment)]
        assignments: Vec<(SliceId, SlicePolicy)>,
    },

    /// Show masks and policies of every slice
    Show,
}

fn load_config(cli: &Cli) -> Result<SliceConfig> {
    let mut config = match &cli.config {
        Some(path) => SliceConfig::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => SliceConfig::load().context("Failed to load configuration")?,
    };

    if let Some(dir) = &cli.dir {
        config.store.dir = dir.clone();
    }
    if let Some(tenants) = cli.tenants {
        config.tenants = tenants;
    }
    if cli.uplink {
        config.store.uplink = true;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "slice_cli={0},slice_alloc={0},slice_store={0}",
            log_level
        ))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Starting slicectl with config: {:?}", cli);

    let config = load_config(&cli)?;
    debug!(dir = %config.store.dir.display(), tenants = config.tenants, "Loaded configuration");

    let output_format = if cli.json { OutputFormat::Json } else { cli.output };

    let mut store = FileStore::from_config(&config);

    match cli.command {
        Commands::Equal => alloc::handle_equal(&mut store, &config, output_format)?,
        Commands::Range { ranges } => alloc::handle_range(&mut store, &config, ranges, output_format)?,
        Commands::SetMask { slice, mask } => {
            alloc::handle_set_mask(&mut store, &config, slice, mask, output_format)?
        }
        Commands::Relative { slice, units, policy } => {
            relative::handle_relative(&mut store, &config, slice, units, policy, output_format)?
        }
        Commands::SetPolicy { assignments } => {
            policy::handle_set_policy(&mut store, &config, assignments, output_format)?
        }
        Commands::Show => show::handle_show(&store, &config, output_format)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use slice_core::SliceStore;
    use tempfile::TempDir;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["slicectl", "range", "0=0-11", "1=12-23"]).unwrap();
        match cli.command {
            Commands::Range { ranges } => {
                assert_eq!(ranges, vec![(0, SliceRange::new(0, 11)), (1, SliceRange::new(12, 23))]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["slicectl", "--json", "relative", "1", "6", "--policy", "wf"]).unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Relative { slice: 1, units: 6, policy: Some(SlicePolicy::Waterfilling) }
        ));

        assert!(Cli::try_parse_from(["slicectl", "set-mask", "0", "10x1"]).is_err());
        assert!(Cli::try_parse_from(["slicectl", "set-policy"]).is_err());
    }

    #[test]
    fn test_commands_against_record_directory() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("sliced.yaml");
        std::fs::write(&config_path, "tenants: 2\n").unwrap();

        let cli = Cli::try_parse_from([
            "slicectl",
            "--config",
            config_path.to_str().unwrap(),
            "--dir",
            dir.path().to_str().unwrap(),
            "--tenants",
            "3",
            "equal",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.tenants, 3);

        let mut store = FileStore::from_config(&config);
        alloc::handle_equal(&mut store, &config, OutputFormat::Json).unwrap();
        policy::handle_set_policy(&mut store, &config, vec![(2, SlicePolicy::Waterfilling)], OutputFormat::Json)
            .unwrap();

        assert_eq!(store.read_mask(0).unwrap().count(), 9);
        assert_eq!(store.read_mask(2).unwrap().count(), 8);
        assert_eq!(store.read_policies().unwrap().get(2), Some(SlicePolicy::Waterfilling));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("slice_scheduling_policy.txt")).unwrap(),
            "0::0\n1::0\n2::1\n"
        );
    }
}
