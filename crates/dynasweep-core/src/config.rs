//! Campaign configuration
//!
//! Loadable from TOML:
//!
//! ```toml
//! root = "runs"
//! restarts = 2
//! properties = ["p", "T"]
//!
//! [budgets]
//! equilibration_events_per_particle = 1000
//! production_events_per_particle = 10000
//! block_events_per_particle = 1000
//!
//! [[variables]]
//! name = "N"
//! values = [256, 500]
//!
//! [simulator]
//! setup_program = "dynamo-setup"
//! run_program = "dynamo-run"
//! ```

use crate::error::{Error, Result};
use crate::state::{StateValue, StateVariable};
use crate::workdir::MismatchPolicy;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Event budgets, all expressed per particle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budgets {
    /// Equilibration events per particle (stage 0)
    pub equilibration_events_per_particle: u64,
    /// Total production events per particle
    pub production_events_per_particle: u64,
    /// Production events per particle per stage
    pub block_events_per_particle: u64,
}

impl Budgets {
    /// Create budgets
    #[inline]
    #[must_use]
    pub fn new(equilibration: u64, production: u64, block: u64) -> Self {
        Self {
            equilibration_events_per_particle: equilibration,
            production_events_per_particle: production,
            block_events_per_particle: block,
        }
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self::new(1000, 10_000, 1000)
    }
}

/// External setup and run executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSimulatorConfig {
    /// Program producing initial configurations
    pub setup_program: String,
    /// Program advancing configurations
    pub run_program: String,
    /// Setup exit code meaning "skip this state"
    #[serde(default = "default_skip_exit_code")]
    pub skip_exit_code: i32,
}

impl ProcessSimulatorConfig {
    /// Create with the default skip code
    #[must_use]
    pub fn new(setup_program: impl Into<String>, run_program: impl Into<String>) -> Self {
        Self {
            setup_program: setup_program.into(),
            run_program: run_program.into(),
            skip_exit_code: default_skip_exit_code(),
        }
    }

    /// With skip exit code
    #[inline]
    #[must_use]
    pub fn with_skip_exit_code(mut self, code: i32) -> Self {
        self.skip_exit_code = code;
        self
    }
}

/// Campaign configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// Root directory holding one subdirectory per work item
    pub root: PathBuf,
    /// Swept variables in declared order
    #[serde(default)]
    pub variables: Vec<StateVariable>,
    /// Independent repetitions per state
    #[serde(default = "default_restarts")]
    pub restarts: u32,
    /// Worker count (1 runs in the caller)
    #[serde(default = "default_processes")]
    pub processes: usize,
    /// Requested property names
    #[serde(default)]
    pub properties: Vec<String>,
    /// Event budgets
    #[serde(default)]
    pub budgets: Budgets,
    /// Failure log, relative to the working directory
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,
    /// Progress report interval
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Write `.json.gz` instead of `.json`
    #[serde(default = "default_true")]
    pub compress: bool,
    /// Aggregate only states whose values are all currently declared
    #[serde(default = "default_true")]
    pub only_current_values: bool,
    /// Reconciliation mismatch handling
    #[serde(default)]
    pub on_rederive_mismatch: MismatchPolicy,
    /// External simulator, if driven by processes
    #[serde(default)]
    pub simulator: Option<ProcessSimulatorConfig>,
}

fn default_restarts() -> u32 {
    1
}

fn default_processes() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn default_error_log() -> PathBuf {
    PathBuf::from("error.log")
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_skip_exit_code() -> i32 {
    3
}

impl CampaignConfig {
    /// Configuration with defaults rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            variables: Vec::new(),
            restarts: default_restarts(),
            processes: default_processes(),
            properties: Vec::new(),
            budgets: Budgets::default(),
            error_log: default_error_log(),
            poll_interval_ms: default_poll_interval_ms(),
            compress: true,
            only_current_values: true,
            on_rederive_mismatch: MismatchPolicy::default(),
            simulator: None,
        }
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `Configuration` on malformed input
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// IO failures and malformed input
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// With a swept variable appended
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = StateValue>,
    ) -> Self {
        self.variables.push(StateVariable::new(name, values));
        self
    }

    /// With restarts per state
    #[inline]
    #[must_use]
    pub fn with_restarts(mut self, restarts: u32) -> Self {
        self.restarts = restarts;
        self
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    /// With a requested property appended
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    /// With event budgets
    #[inline]
    #[must_use]
    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// With failure log location
    #[must_use]
    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = path.into();
        self
    }

    /// With progress interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval_ms(mut self, millis: u64) -> Self {
        self.poll_interval_ms = millis;
        self
    }

    /// With document compression on or off
    #[inline]
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// With aggregation restricted to declared values or not
    #[inline]
    #[must_use]
    pub fn with_only_current_values(mut self, only: bool) -> Self {
        self.only_current_values = only;
        self
    }

    /// With reconciliation mismatch policy
    #[inline]
    #[must_use]
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.on_rederive_mismatch = policy;
        self
    }

    /// With external simulator programs
    #[must_use]
    pub fn with_simulator(mut self, simulator: ProcessSimulatorConfig) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Progress report interval
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Failure log location, relative paths resolve against the process
    /// working directory
    #[must_use]
    pub fn error_log_path(&self) -> PathBuf {
        self.error_log.clone()
    }

    /// Check values serde cannot
    ///
    /// # Errors
    /// `Configuration` on zero workers or a zero block with a non-zero
    /// production budget
    pub fn validate(&self) -> Result<()> {
        if self.processes == 0 {
            return Err(Error::Configuration("processes must be at least 1".into()));
        }
        if self.budgets.block_events_per_particle == 0
            && self.budgets.production_events_per_particle > 0
        {
            return Err(Error::Configuration(
                "block_events_per_particle must be positive".into(),
            ));
        }
        Ok(())
    }
}
