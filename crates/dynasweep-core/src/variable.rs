//! How state variables relate to simulation content
//!
//! Some variables can be re-read from a configuration file (the particle
//! count, the number density, ...); reconciliation uses those readings as
//! the source of truth. Others are pure labels that can only be carried over
//! from a persisted snapshot, optionally with a fallback value for snapshots
//! that predate the variable.

use crate::error::Result;
use crate::state::StateValue;
use dynasweep_document::ConfigFile;
use std::collections::HashMap;

/// Quantity computable from a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigQuery {
    /// Number of particles
    ParticleCount,
    /// Particles per unit volume
    NumberDensity,
    /// Single-occupancy cell radius (`+inf` when absent)
    SoCellRadius,
}

impl ConfigQuery {
    /// Evaluate against a configuration
    ///
    /// # Errors
    /// Propagates document lookups
    pub fn evaluate(self, config: &ConfigFile) -> Result<StateValue> {
        Ok(match self {
            Self::ParticleCount => {
                StateValue::Int(i64::try_from(config.particle_count()?).unwrap_or(i64::MAX))
            }
            Self::NumberDensity => StateValue::float(config.number_density()?),
            Self::SoCellRadius => StateValue::float(config.so_cell_radius()?),
        })
    }
}

/// Where a variable's value comes from during reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// Re-derivable: the configuration overrides the persisted value
    FromConfig(ConfigQuery),
    /// Not re-derivable: keep the persisted value, use this if absent
    Fallback(StateValue),
}

/// Explicit table of known state variable derivations
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    entries: HashMap<String, Derivation>,
}

impl VariableCatalog {
    /// Empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the standard variables
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register("N", Derivation::FromConfig(ConfigQuery::ParticleCount));
        catalog.register("ndensity", Derivation::FromConfig(ConfigQuery::NumberDensity));
        catalog.register("Rso", Derivation::FromConfig(ConfigQuery::SoCellRadius));
        catalog.register("InitState", Derivation::Fallback(StateValue::text("FCC")));
        catalog
    }

    /// Register or replace a derivation
    pub fn register(&mut self, name: impl Into<String>, derivation: Derivation) {
        self.entries.insert(name.into(), derivation);
    }

    /// Derivation for a variable, if known
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Derivation> {
        self.entries.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynasweep_document::Document;
    use serde_json::json;

    #[test]
    fn default_catalog() {
        let catalog = VariableCatalog::with_defaults();
        assert!(matches!(
            catalog.get("ndensity"),
            Some(Derivation::FromConfig(ConfigQuery::NumberDensity))
        ));
        assert_eq!(
            catalog.get("InitState"),
            Some(&Derivation::Fallback(StateValue::text("FCC")))
        );
        assert!(catalog.get("unknown").is_none());
    }

    #[test]
    fn queries_evaluate_against_config() {
        let config = ConfigFile::from_document(Document::from_value(
            "c.json",
            json!({
                "SimulationSize": { "x": 1.0, "y": 1.0, "z": 4.0 },
                "ParticleData": { "Pt": [{}, {}] }
            }),
        ));
        assert_eq!(
            ConfigQuery::ParticleCount.evaluate(&config).unwrap(),
            StateValue::Int(2)
        );
        assert_eq!(
            ConfigQuery::NumberDensity.evaluate(&config).unwrap(),
            StateValue::float(0.5)
        );
        assert_eq!(
            ConfigQuery::SoCellRadius.evaluate(&config).unwrap(),
            StateValue::float(f64::INFINITY)
        );
    }
}
