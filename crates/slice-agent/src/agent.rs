//! Main agent implementation

use crate::config::{AgentConfig, ControllerMode};
use crate::controller::{HeuristicController, IterationReport};
use crate::rotation::RotationController;
use crate::Result;
use slice_alloc::MaskAllocator;
use slice_store::{FileStore, MemoryStore, StoreBackend};
use slice_telemetry::{CsvMetricsSource, MetricsSource, MetricsWindow};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Controller driving the records
#[derive(Debug)]
pub enum Controller {
    Heuristic(HeuristicController<StoreBackend>),
    Rotation(RotationController<StoreBackend>),
}

impl Controller {
    fn store(&self) -> &StoreBackend {
        match self {
            Self::Heuristic(controller) => controller.store(),
            Self::Rotation(controller) => controller.store(),
        }
    }
}

/// The slicing agent
pub struct Agent {
    config: AgentConfig,
    controller: Controller,
    source: Box<dyn MetricsSource>,
    rounds: u64,
}

impl Agent {
    /// Create a new agent
    pub fn new(config: AgentConfig, store: StoreBackend, source: Box<dyn MetricsSource>) -> Self {
        let pool = config.slicing.pool;
        let tenants = config.slicing.tenants;

        let controller = match config.agent.mode {
            ControllerMode::Heuristic => {
                Controller::Heuristic(HeuristicController::new(store, pool, tenants, &config.heuristic))
            }
            ControllerMode::Rotation => Controller::Rotation(RotationController::new(
                store,
                pool,
                tenants,
                config.rotation.allocations.clone(),
            )),
        };

        Self {
            config,
            controller,
            source,
            rounds: 0,
        }
    }

    /// Apply the startup allocation: the configured initial allocation in
    /// heuristic mode, the first allocation of the cycle in rotation mode.
    pub fn start(&mut self) -> Result<Option<IterationReport>> {
        info!(
            name = %self.config.agent.name,
            mode = ?self.config.agent.mode,
            tenants = self.config.slicing.tenants,
            store = self.controller.store().kind(),
            "Starting slicing agent"
        );

        match &mut self.controller {
            Controller::Heuristic(controller) => {
                if let Some(request) = &self.config.agent.initial_allocation {
                    let mut allocator = MaskAllocator::new(
                        controller.store_mut(),
                        self.config.slicing.pool,
                        self.config.slicing.tenants,
                    );
                    allocator.apply(request)?;
                    info!("Initial allocation applied");
                }
                Ok(None)
            }
            Controller::Rotation(controller) => {
                let report = controller.try_step().map_err(|e| {
                    error!(category = e.category(), error = %e, "Initial rotation allocation failed");
                    e
                })?;
                Ok(Some(report))
            }
        }
    }

    /// Run a single controller iteration
    pub fn run_once(&mut self) -> IterationReport {
        let report = match &mut self.controller {
            Controller::Heuristic(controller) => {
                let (window, telemetry_error) = match self.source.collect() {
                    Ok(window) => (window, None),
                    Err(e) => {
                        if e.is_retryable() {
                            warn!(error = %e, "Metrics window unavailable, evaluating without data");
                        } else {
                            error!(error = %e, "Metrics source failed, evaluating without data");
                        }
                        (MetricsWindow::empty(), Some(format!("collecting metrics: {}", e)))
                    }
                };

                let mut report = controller.step(&window);
                if let Some(e) = telemetry_error {
                    report.errors.insert(0, e);
                }
                report
            }
            Controller::Rotation(controller) => controller.step(),
        };

        self.rounds += 1;
        info!(
            round = report.round,
            masks_written = ?report.masks_written,
            policies_written = report.policies_written,
            errors = report.errors.len(),
            "Round complete"
        );

        report
    }

    /// Run until shutdown signal is received
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the startup allocation, then one iteration per period until
    /// `shutdown` resolves or the configured round limit is reached. The
    /// first iteration happens one period after startup.
    pub async fn run_until<F: Future<Output = ()>>(&mut self, shutdown: F) -> Result<()> {
        self.start()?;

        let period = Duration::from_secs(self.config.agent.period_seconds);
        tokio::pin!(shutdown);

        loop {
            if let Some(max_rounds) = self.config.agent.max_rounds {
                if self.rounds >= max_rounds {
                    info!(rounds = self.rounds, "Round limit reached");
                    break;
                }
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(period) => {}
            }

            let report = self.run_once();
            for e in &report.errors {
                error!(round = report.round, error = %e, "Round error");
            }
        }

        info!(rounds = self.rounds, "Slicing agent stopped");
        Ok(())
    }

    /// Get the agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &StoreBackend {
        self.controller.store()
    }

    /// Iterations run so far
    pub fn rounds(&self) -> u64 {
        self.rounds
    }
}

/// Wait for termination signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Cannot install SIGTERM handler"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Builder for creating agents
#[derive(Default)]
pub struct AgentBuilder {
    config: Option<AgentConfig>,
    store: Option<StoreBackend>,
    source: Option<Box<dyn MetricsSource>>,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the agent configuration
    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a specific store instead of the one derived from the configuration
    pub fn with_store(mut self, store: StoreBackend) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a specific metrics source instead of the CSV directory
    pub fn with_source(mut self, source: Box<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<Agent> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None if config.agent.dry_run => {
                info!("Dry run, records are kept in memory");
                StoreBackend::Memory(MemoryStore::new(config.slicing.pool.size))
            }
            None => StoreBackend::File(FileStore::from_config(&config.slicing)),
        };

        let source: Box<dyn MetricsSource> = match self.source {
            Some(source) => source,
            None => Box::new(CsvMetricsSource::new(config.telemetry.clone())?),
        };

        Ok(Agent::new(config, store, source))
    }
}
