//! Main binary for the slicing daemon (sliced)

use clap::{Parser, Subcommand};
use slice_agent::{init_logging, AgentBuilder, AgentConfig, AgentError, ControllerMode, Result};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sliced")]
#[command(about = "Adaptive RBG slicing controller")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Keep records in memory instead of writing the record directory
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control loop until interrupted
    Run {
        /// Stop after this many iterations
        #[arg(long)]
        rounds: Option<u64>,

        /// Override the iteration period
        #[arg(long, value_name = "SECONDS")]
        period: Option<u64>,
    },
    /// Run a single iteration and print its report
    Once,
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate {
        /// Configuration file to validate
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { rounds, period }) => run_agent(&cli, rounds, period).await,
        Some(Commands::Once) => run_once(&cli),
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate { ref config }) => validate_config(config.clone()),
        None => run_agent(&cli, None, None).await,
    }
}

fn load_config(cli: &Cli) -> Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)?,
        None => AgentConfig::from_environment()?,
    };

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.dry_run {
        config.agent.dry_run = true;
    }

    Ok(config)
}

async fn run_agent(cli: &Cli, rounds: Option<u64>, period: Option<u64>) -> Result<()> {
    let mut config = load_config(cli)?;
    if rounds.is_some() {
        config.agent.max_rounds = rounds;
    }
    if let Some(period) = period {
        config.agent.period_seconds = period;
    }

    init_logging(&config.logging)?;
    match &cli.config {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("Using default configuration"),
    }

    let mut agent = AgentBuilder::new().with_config(config).build()?;

    if let Err(e) = agent.run().await {
        error!("Agent failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run_once(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    init_logging(&config.logging)?;

    let mut agent = AgentBuilder::new().with_config(config).build()?;
    let report = agent.run_once();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        let yaml = serde_yaml::to_string(&config)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;
        println!("{}", yaml);
    }

    Ok(())
}

fn validate_config(config_path: PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = AgentConfig::from_file(&config_path)?;
    config.validate()?;

    println!("Configuration is valid");
    println!("Agent name: {}", config.agent.name);
    println!("Tenants: {}", config.slicing.tenants);
    println!("Pool: {} units (limit {})", config.slicing.pool.size, config.slicing.pool.limit);
    println!("Record directory: {}", config.slicing.store.dir.display());
    println!("Period: {}s", config.agent.period_seconds);
    match config.agent.mode {
        ControllerMode::Heuristic => {
            println!("Mode: heuristic");
            println!("  - Metrics directory: {}", config.telemetry.dir.display());
            println!("  - Buffer unit: {}", config.heuristic.buffer_free_index);
            println!("  - Throughput unit: {}", config.heuristic.throughput_free_index);
        }
        ControllerMode::Rotation => {
            println!("Mode: rotation ({} allocations)", config.rotation.allocations.len());
        }
    }

    Ok(())
}
