//! dynasweep - parameter sweep campaigns over external simulations
//!
//! A campaign declares state variables, each with a list of candidate
//! values, and drives one external simulation per point of their cross
//! product (times a number of independent restarts):
//! - every point owns a stable run directory under the campaign root
//! - points are set up, equilibrated, then grown block by block in waves
//! - interrupted campaigns resume by skipping every stage already on disk
//! - results from all stages and restarts aggregate into one table
//!
//! # Example
//!
//! ```rust,ignore
//! use dynasweep_core::prelude::*;
//!
//! # async fn example() -> dynasweep_core::Result<()> {
//! let config = CampaignConfig::from_file("sweep.toml")?;
//! let campaign = Campaign::from_config(config)?;
//!
//! campaign.reconcile()?;
//! campaign.run().await?;
//! println!("{}", campaign.fetch_data()?);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod aggregate;
pub mod campaign;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod property;
pub mod scheduler;
pub mod simulator;
pub mod state;
pub mod variable;
pub mod workdir;

// Re-exports for convenience
pub use aggregate::{Aggregator, ResultRow, ResultTable};
pub use campaign::Campaign;
pub use config::{Budgets, CampaignConfig, ProcessSimulatorConfig};
pub use driver::{DriveOutcome, RunDriver};
pub use error::{Error, Result};
pub use property::{
    Accumulator, AttributeRule, Dependencies, MissingPolicy, PropertyDescriptor, PropertyKind,
    PropertyRegistry, PropertyValue, ResolvedProperties, SeriesRule, Weighting,
};
pub use scheduler::{block_targets, build_tasks, RunSummary, Scheduler, Task, TaskExecutor};
pub use simulator::{
    ProcessSimulator, RunLog, RunRequest, SetupOutcome, SetupRequest, Simulator,
};
pub use state::{State, StateSpace, StateValue, StateVariable};
pub use variable::{ConfigQuery, Derivation, VariableCatalog};
pub use workdir::{
    MismatchPolicy, ReconcileReport, Resolver, StageFiles, StateSnapshot, WorkItem,
};

pub use dynasweep_stats::{Estimate, WeightedFloat};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a campaign
    pub use crate::{
        Budgets, Campaign, CampaignConfig, Error, MismatchPolicy, PropertyRegistry, Result,
        ResultTable, State, StateValue, VariableCatalog,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
