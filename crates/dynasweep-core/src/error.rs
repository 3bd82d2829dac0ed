//! Error types for dynasweep
//!
//! The taxonomy follows how far a failure is allowed to propagate:
//! - configuration errors abort a campaign before any work starts
//! - per-item errors (external process, corruption, panics) are collected
//!   by the scheduler and never affect sibling items
//! - [`Error::AggregateExecution`] is raised once the task list drains

use dynasweep_document::DocumentError;
use std::path::PathBuf;

/// Convenience alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main dynasweep error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid campaign definition
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A requested property is not registered
    #[error("the \"{0}\" property is not defined")]
    UnknownProperty(String),

    /// A property depends on a state variable the campaign does not declare
    #[error("the \"{property}\" property requires the \"{variable}\" state variable, but it is missing")]
    MissingStateVariable { property: String, variable: String },

    /// A required external executable is not on the search path
    #[error("could not find the {0} executable")]
    MissingTool(String),

    /// External executable exited unsuccessfully
    #[error("external process failed ({status}), command was\n\"{command}\"\nsee logfile \"{}\"", log.display())]
    ExternalProcess {
        command: String,
        log: PathBuf,
        status: String,
    },

    /// Initial configuration could not be produced
    #[error("setup failed for {}: {reason}\nsee logfile \"{}\"", dir.display(), log.display())]
    SetupFailed {
        dir: PathBuf,
        reason: String,
        log: PathBuf,
    },

    /// An expected stage file is missing or malformed
    #[error("corrupt run directory at {}: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    /// One or more per-item failures were collected during a run
    #[error("parallel execution failed: {failures} task(s) failed, details in \"{}\"", log.display())]
    AggregateExecution { failures: usize, log: PathBuf },

    /// A worker panicked while driving an item
    #[error("worker panicked while driving {0}")]
    TaskPanicked(String),

    /// Reconciliation refused to rewrite a directory
    #[error("reconciliation conflict in {}: {reason}", dir.display())]
    Reconcile { dir: PathBuf, reason: String },

    /// Persisted state snapshot could not be read or written
    #[error("state snapshot error in {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    /// Document access failed
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Filesystem error
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create corruption error for path
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check if error must abort the campaign before any work starts
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::UnknownProperty(_)
                | Self::MissingStateVariable { .. }
                | Self::MissingTool(_)
        )
    }

    /// Check if error ends the campaign operation that raised it
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_per_item()
    }

    /// Check if error is confined to a single work item
    #[inline]
    #[must_use]
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::ExternalProcess { .. }
                | Self::SetupFailed { .. }
                | Self::Corruption { .. }
                | Self::TaskPanicked(_)
                | Self::Document(_)
                | Self::Snapshot { .. }
                | Self::Io { .. }
        )
    }
}
