//! Stage output view

use crate::document::Document;
use crate::error::DocumentError;
use std::path::Path;

/// A per-stage measurement output document
#[derive(Debug, Clone)]
pub struct OutputFile {
    doc: Document,
}

impl OutputFile {
    /// Load an output document
    ///
    /// # Errors
    /// Propagates load/parse failures
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        Ok(Self {
            doc: Document::open(path)?,
        })
    }

    /// Wrap an already loaded document
    #[inline]
    #[must_use]
    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    /// Underlying document
    #[inline]
    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Particle count recorded by the run
    ///
    /// # Errors
    /// `MissingNode`/`MissingAttribute` if not recorded
    pub fn particle_count(&self) -> Result<f64, DocumentError> {
        self.doc.require_f64("ParticleCount", "val")
    }

    /// Events executed during the stage
    ///
    /// # Errors
    /// `MissingNode`/`MissingAttribute` if not recorded
    pub fn events(&self) -> Result<f64, DocumentError> {
        self.doc.require_f64("Duration", "Events")
    }

    /// Simulation time elapsed during the stage
    ///
    /// # Errors
    /// `MissingNode`/`MissingAttribute` if not recorded
    pub fn time(&self) -> Result<f64, DocumentError> {
        self.doc.require_f64("Duration", "Time")
    }

    /// Events per particle, the unit production budgets are expressed in
    ///
    /// # Errors
    /// As [`events`](Self::events) and [`particle_count`](Self::particle_count)
    pub fn events_per_particle(&self) -> Result<f64, DocumentError> {
        let n = self.particle_count()?;
        let events = self.events()?;
        Ok(if n > 0.0 { events / n } else { events })
    }
}
