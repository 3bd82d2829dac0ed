//! Per-item run driver
//!
//! Brings one work item up to a production target:
//! 1. make sure an initial configuration exists (setup)
//! 2. equilibrate once (stage 0)
//! 3. add production stages of one block each until the target is met
//!
//! Every stage whose documents already validate is skipped, so driving an
//! item again after an interruption only redoes the missing work.

use crate::error::{Error, Result};
use crate::scheduler::{Task, TaskExecutor};
use crate::simulator::{RunLog, RunRequest, SetupOutcome, SetupRequest, Simulator};
use crate::workdir::{Resolver, WorkItem};
use dynasweep_document::{validate, ConfigFile, OutputFile};
use std::sync::Arc;
use tracing::{debug, info};

/// How far a drive got
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriveOutcome {
    /// Setup declined the state; nothing was simulated
    Skipped,
    /// Target reached
    Complete {
        /// Stages actually simulated by this call
        stages_run: u32,
        /// Production events per particle now on disk
        particle_events: f64,
    },
}

/// Drives work items through setup, equilibration and production
pub struct RunDriver {
    simulator: Arc<dyn Simulator>,
    resolver: Resolver,
    equilibration_events_per_particle: u64,
    block_events_per_particle: u64,
    options: Vec<String>,
}

impl std::fmt::Debug for RunDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDriver")
            .field("root", &self.resolver.root())
            .field("equilibration", &self.equilibration_events_per_particle)
            .field("block", &self.block_events_per_particle)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RunDriver {
    /// Create a driver
    #[must_use]
    pub fn new(
        simulator: Arc<dyn Simulator>,
        resolver: Resolver,
        equilibration_events_per_particle: u64,
        block_events_per_particle: u64,
    ) -> Self {
        Self {
            simulator,
            resolver,
            equilibration_events_per_particle,
            block_events_per_particle,
            options: Vec::new(),
        }
    }

    /// With simulator options passed to every run
    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// Drive `item` until it holds at least `target` production events per
    /// particle
    ///
    /// # Errors
    /// - `SetupFailed` when no initial configuration can be produced
    /// - `ExternalProcess` from the simulator
    /// - `Corruption` when a prior stage vanished or fresh output is invalid
    pub fn drive(&self, item: &WorkItem, target: u64) -> Result<DriveOutcome> {
        if self.block_events_per_particle == 0 && target > 0 {
            return Err(Error::Configuration(
                "block_events_per_particle must be positive".into(),
            ));
        }

        let files = self.resolver.files();
        let dir = item.dir.as_path();
        self.resolver.ensure_created(item)?;
        let mut log = RunLog::open(dir)?;
        log.banner(format!("{} target {target}", item.state))?;

        let start = files.start_config(dir);
        if !validate(&start) {
            let request = SetupRequest {
                target: start.clone(),
                events: self.equilibration_events_per_particle,
                state: item.state.clone(),
            };
            match self.simulator.setup(&request, &mut log) {
                SetupOutcome::Created(path) if validate(&path) => {
                    debug!("created initial configuration for {}", item.label());
                }
                SetupOutcome::Created(path) => {
                    return Err(Error::corruption(path, "setup produced an invalid configuration"));
                }
                SetupOutcome::Skipped => {
                    log.banner("setup skipped this state")?;
                    info!("skipping {}", item.label());
                    return Ok(DriveOutcome::Skipped);
                }
                SetupOutcome::Failed(reason) => {
                    return Err(Error::SetupFailed {
                        dir: dir.to_path_buf(),
                        reason,
                        log: log.path().to_path_buf(),
                    });
                }
            }
        }

        let particles = ConfigFile::open(&start)?.particle_count()?.max(1);
        let mut stages_run = 0;

        if files.is_complete(dir, 0) {
            debug!("{}: equilibration already done", item.label());
        } else {
            log.banner("equilibration")?;
            let events = particles.saturating_mul(self.equilibration_events_per_particle);
            self.run_stage(&mut log, item, 0, events)?;
            stages_run += 1;
        }

        let goal = target as f64;
        let mut done = 0.0;
        let mut stage = 1;
        while done < goal {
            if files.is_complete(dir, stage) {
                let recorded = OutputFile::open(files.data(dir, stage))?.events_per_particle()?;
                debug!(
                    "{}: stage {stage} already holds {recorded} events per particle",
                    item.label()
                );
                done += recorded;
            } else {
                let input = files.input(dir, stage);
                if !validate(&input) {
                    return Err(Error::corruption(
                        input,
                        format!("configuration of stage {} is missing", stage - 1),
                    ));
                }
                log.banner(format!("production stage {stage}"))?;
                let events = particles.saturating_mul(self.block_events_per_particle);
                self.run_stage(&mut log, item, stage, events)?;
                stages_run += 1;
                done += self.block_events_per_particle as f64;
            }
            stage += 1;
        }

        log.banner(format!("reached {done} events per particle"))?;
        Ok(DriveOutcome::Complete {
            stages_run,
            particle_events: done,
        })
    }

    fn run_stage(&self, log: &mut RunLog, item: &WorkItem, stage: u32, events: u64) -> Result<()> {
        let files = self.resolver.files();
        let dir = item.dir.as_path();
        let request = RunRequest {
            input: files.input(dir, stage),
            output: files.config(dir, stage),
            data: files.data(dir, stage),
            events,
            options: self.options.clone(),
        };
        self.simulator.run(&request, log)?;

        for produced in [&request.output, &request.data] {
            if !validate(produced) {
                return Err(Error::corruption(
                    produced.as_path(),
                    format!("stage {stage} output is missing or malformed"),
                ));
            }
        }
        Ok(())
    }
}

impl TaskExecutor for RunDriver {
    fn execute(&self, task: &Task) -> Result<DriveOutcome> {
        self.drive(&task.item, task.target)
    }
}
