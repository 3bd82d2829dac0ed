//! Campaign facade
//!
//! Ties the pieces together for one sweep. Everything that can be wrong
//! with the definition itself (state space, properties, tools, budgets) is
//! checked in [`Campaign::new`], before any directory is touched by a
//! simulation.

use crate::aggregate::{Aggregator, ResultTable};
use crate::config::CampaignConfig;
use crate::driver::RunDriver;
use crate::error::{Error, Result};
use crate::property::{PropertyRegistry, ResolvedProperties};
use crate::scheduler::{block_targets, build_tasks, RunSummary, Scheduler};
use crate::simulator::{ProcessSimulator, Simulator};
use crate::state::StateSpace;
use crate::variable::VariableCatalog;
use crate::workdir::{ReconcileReport, Resolver, StageFiles, WorkItem};
use std::sync::Arc;
use tracing::info;

/// A configured parameter sweep
pub struct Campaign {
    config: CampaignConfig,
    space: StateSpace,
    resolver: Resolver,
    properties: ResolvedProperties,
    catalog: VariableCatalog,
    simulator: Arc<dyn Simulator>,
}

impl Campaign {
    /// Validate a campaign definition
    ///
    /// # Errors
    /// - `Configuration` for invalid variables or budgets
    /// - `UnknownProperty` / `MissingStateVariable` from property resolution
    /// - `MissingTool` when the simulator is unavailable
    pub fn new(
        config: CampaignConfig,
        simulator: Arc<dyn Simulator>,
        registry: &PropertyRegistry,
        catalog: VariableCatalog,
    ) -> Result<Self> {
        config.validate()?;
        let space = StateSpace::new(config.variables.clone(), config.restarts)?;
        let properties = registry.resolve(config.properties.as_slice(), space.variables())?;
        simulator.check_available()?;

        std::fs::create_dir_all(&config.root).map_err(|e| Error::io(&config.root, e))?;
        let resolver = Resolver::new(&config.root, StageFiles::new(config.compress));

        info!(
            "campaign at {}: {} state(s) x {} restart(s), properties [{}]",
            config.root.display(),
            space.state_count(),
            space.restarts(),
            properties.names().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            config,
            space,
            resolver,
            properties,
            catalog,
            simulator,
        })
    }

    /// Campaign driven by the configured external programs with the
    /// default property and variable tables
    ///
    /// # Errors
    /// As [`new`](Self::new), or `Configuration` without a `[simulator]`
    pub fn from_config(config: CampaignConfig) -> Result<Self> {
        let programs = config
            .simulator
            .clone()
            .ok_or_else(|| Error::Configuration("no simulator programs configured".into()))?;
        Self::new(
            config,
            Arc::new(ProcessSimulator::new(programs)),
            &PropertyRegistry::with_defaults(),
            VariableCatalog::with_defaults(),
        )
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Validated state space
    #[inline]
    #[must_use]
    pub fn space(&self) -> &StateSpace {
        &self.space
    }

    /// Directory resolver
    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Resolved properties and run options
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &ResolvedProperties {
        &self.properties
    }

    /// Every `(state, restart)` with its directory
    ///
    /// # Errors
    /// See [`Resolver::items`]
    pub fn work_items(&self) -> Result<Vec<WorkItem>> {
        self.space.items(&self.resolver)
    }

    /// Bring existing directories in line with the declared variables
    ///
    /// # Errors
    /// IO failures while rewriting or moving directories
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let report = self.resolver.reconcile(
            self.space.variables(),
            &self.catalog,
            self.config.on_rederive_mismatch,
        )?;
        info!(
            "reconciled {} director(ies): {} rewritten, {} moved, {} conflict(s)",
            report.examined,
            report.rewritten.len(),
            report.moved.len(),
            report.conflicts.len()
        );
        Ok(report)
    }

    /// Drive every item to the production budget
    ///
    /// # Errors
    /// `AggregateExecution` once all tasks drained if any of them failed
    pub async fn run(&self) -> Result<RunSummary> {
        let budgets = self.config.budgets;
        let targets = block_targets(
            budgets.production_events_per_particle,
            budgets.block_events_per_particle,
        )?;
        let items = self.work_items()?;
        let tasks = build_tasks(&items, &targets);

        let driver = RunDriver::new(
            Arc::clone(&self.simulator),
            self.resolver.clone(),
            budgets.equilibration_events_per_particle,
            budgets.block_events_per_particle,
        )
        .with_options(self.properties.run_options().to_vec());

        Scheduler::new(
            Arc::new(driver),
            self.config.processes,
            self.config.error_log_path(),
        )
        .with_poll_interval(self.config.poll_interval())
        .run(tasks)
        .await
    }

    /// Aggregate everything currently on disk
    ///
    /// # Errors
    /// See [`Aggregator::collect`]
    pub fn fetch_data(&self) -> Result<ResultTable> {
        Aggregator::new(
            self.resolver.clone(),
            self.space.clone(),
            self.properties.clone(),
        )
        .with_only_current_values(self.config.only_current_values)
        .collect()
    }
}

impl std::fmt::Debug for Campaign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Campaign")
            .field("config", &self.config)
            .field("space", &self.space)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}
