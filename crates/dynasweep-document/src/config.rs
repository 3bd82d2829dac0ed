//! Configuration snapshot view

use crate::document::{as_f64, Document};
use crate::error::DocumentError;
use std::path::Path;

const PARTICLES: &str = "ParticleData/Pt";
const SIMULATION_SIZE: &str = "SimulationSize";
const SO_CELLS: &str = "Globals/Global[Type=SOCells]";

/// A simulation configuration document
///
/// Exposes the derived quantities state variables can be re-read from.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    doc: Document,
}

impl ConfigFile {
    /// Load a configuration document
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

    /// Number of particles
    ///
    /// # Errors
    /// Selector failures only; an empty configuration has zero particles
    pub fn particle_count(&self) -> Result<u64, DocumentError> {
        Ok(self.doc.find_all(PARTICLES)?.len() as u64)
    }

    /// Primary image volume
    ///
    /// # Errors
    /// `MissingNode`/`MissingAttribute` if the simulation size is absent
    pub fn volume(&self) -> Result<f64, DocumentError> {
        let x = self.doc.require_f64(SIMULATION_SIZE, "x")?;
        let y = self.doc.require_f64(SIMULATION_SIZE, "y")?;
        let z = self.doc.require_f64(SIMULATION_SIZE, "z")?;
        Ok(x * y * z)
    }

    /// Number density `N / V`
    ///
    /// # Errors
    /// As [`volume`](Self::volume)
    pub fn number_density(&self) -> Result<f64, DocumentError> {
        #[allow(clippy::cast_precision_loss)]
        let n = self.particle_count()? as f64;
        Ok(n / self.volume()?)
    }

    /// Radius of the single-occupancy cells, `+inf` when not configured
    ///
    /// # Errors
    /// `NotNumeric` if the diameter is malformed
    pub fn so_cell_radius(&self) -> Result<f64, DocumentError> {
        let Some(global) = self.doc.find(SO_CELLS)? else {
            return Ok(f64::INFINITY);
        };
        global
            .get("Diameter")
            .and_then(as_f64)
            .map(|d| d / 2.0)
            .ok_or_else(|| DocumentError::NotNumeric {
                path: self.doc.path().to_path_buf(),
                selector: SO_CELLS.to_string(),
                attribute: "Diameter".to_string(),
            })
    }
}
