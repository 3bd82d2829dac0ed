//! Output properties and their dependencies
//!
//! A [`PropertyDescriptor`] names one measurement, says how to extract its
//! per-stage contribution from an [`OutputFile`], and declares what the
//! campaign must provide for it to be meaningful:
//! - state variables that must be swept
//! - other properties that must be collected alongside
//! - run options (measurement plugins) the simulator must be invoked with
//!
//! The [`PropertyRegistry`] is an explicit value handed to the campaign;
//! [`PropertyRegistry::resolve`] checks every dependency up front so a
//! misconfigured campaign fails before any simulation starts.

use crate::error::{Error, Result};
use crate::state::StateVariable;
use dynasweep_document::document::as_f64;
use dynasweep_document::{DocumentError, OutputFile, Selector};
use dynasweep_stats::{Estimate, WeightedFloat};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// What a stage's contribution is weighted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Elapsed simulation time
    Time,
    /// Executed event count
    Events,
}

/// Behaviour when a stage output lacks the measured attribute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Missing data is an error
    Fail,
    /// Substitute a value carrying the stage's full weight
    Default(f64),
    /// The stage contributes nothing (zero weight)
    Skip,
}

/// Declared requirements of a property
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// State variables the campaign must sweep
    pub state_variables: Vec<String>,
    /// Properties that are collected alongside
    pub properties: Vec<String>,
    /// Options the simulator must run with
    pub run_options: Vec<String>,
}

impl Dependencies {
    /// No dependencies
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Require a state variable
    #[must_use]
    pub fn state_variable(mut self, name: impl Into<String>) -> Self {
        self.state_variables.push(name.into());
        self
    }

    /// Require another property
    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    /// Require a run option
    #[must_use]
    pub fn run_option(mut self, option: impl Into<String>) -> Self {
        self.run_options.push(option.into());
        self
    }
}

/// A single numeric attribute read from each stage output
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRule {
    /// Node selector
    pub selector: String,
    /// Attribute on the selected node
    pub attribute: String,
    /// Weight policy
    pub weighting: Weighting,
    /// Divide by the particle count
    pub div_by_n: bool,
    /// Divide by the stage duration
    pub div_by_t: bool,
    /// Behaviour when absent
    pub missing: MissingPolicy,
}

impl AttributeRule {
    /// Time-weighted attribute that must be present
    #[must_use]
    pub fn new(selector: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            attribute: attribute.into(),
            weighting: Weighting::Time,
            div_by_n: false,
            div_by_t: false,
            missing: MissingPolicy::Fail,
        }
    }

    /// Set the weight policy
    #[must_use]
    pub fn weighted_by(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Normalise per particle
    #[must_use]
    pub fn per_particle(mut self) -> Self {
        self.div_by_n = true;
        self
    }

    /// Normalise per unit time
    #[must_use]
    pub fn per_time(mut self) -> Self {
        self.div_by_t = true;
        self
    }

    /// Set the missing-data policy
    #[must_use]
    pub fn when_missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    fn contribution(&self, output: &OutputFile) -> Result<WeightedFloat> {
        let selector = Selector::parse(&self.selector)?;
        let weight = match self.weighting {
            Weighting::Time => output.time()?,
            Weighting::Events => output.events()?,
        };

        let Some(mut value) = output.document().attribute_f64(&selector, &self.attribute)? else {
            return match self.missing {
                MissingPolicy::Fail => Err(DocumentError::MissingAttribute {
                    path: output.document().path().to_path_buf(),
                    selector: self.selector.clone(),
                    attribute: self.attribute.clone(),
                }
                .into()),
                MissingPolicy::Default(v) => Ok(WeightedFloat::new(v, weight)),
                MissingPolicy::Skip => Ok(WeightedFloat::zero()),
            };
        };

        if self.div_by_n {
            let n = output.particle_count()?;
            if n > 0.0 {
                value /= n;
            }
        }
        if self.div_by_t {
            let t = output.time()?;
            if t > 0.0 {
                value /= t;
            }
        }
        Ok(WeightedFloat::new(value, weight))
    }
}

/// One labelled family of tables inside a series node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesGroup {
    /// Key prefix in the result (`Species`, `Topology`, ...)
    pub label: String,
    /// Selector relative to the series node
    pub selector: String,
}

/// Tabular data read from each stage output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRule {
    /// Selector of the series node
    pub selector: String,
    /// Attribute of the series node holding the stage weight
    pub weight_attribute: String,
    /// Table families to collect
    pub groups: Vec<SeriesGroup>,
    /// Field naming each table
    pub name_field: String,
    /// Field holding the table rows
    pub data_field: String,
}

impl SeriesRule {
    fn contribution(&self, output: &OutputFile) -> Result<SeriesAccumulator> {
        let doc = output.document();
        let selector = Selector::parse(&self.selector)?;
        let Some(node) = selector.select(doc.root()) else {
            return Err(DocumentError::MissingNode {
                path: doc.path().to_path_buf(),
                selector: self.selector.clone(),
            }
            .into());
        };
        let weight = doc
            .attribute_f64(&selector, &self.weight_attribute)?
            .ok_or_else(|| DocumentError::MissingAttribute {
                path: doc.path().to_path_buf(),
                selector: self.selector.clone(),
                attribute: self.weight_attribute.clone(),
            })?;

        let mut acc = SeriesAccumulator::default();
        for group in &self.groups {
            for table in Selector::parse(&group.selector)?.select_all(node) {
                let name = table
                    .get(&self.name_field)
                    .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                    .unwrap_or_default();
                let Some(rows) = table.get(&self.data_field).and_then(parse_table) else {
                    return Err(DocumentError::decode(
                        doc.path(),
                        format!("unreadable table {}:{name}", group.label),
                    )
                    .into());
                };
                acc.add(format!("{}:{name}", group.label), weight, &rows);
            }
        }
        Ok(acc)
    }
}

/// Rows either as nested arrays or as whitespace separated text lines
fn parse_table(value: &Value) -> Option<Vec<Vec<f64>>> {
    match value {
        Value::String(text) => text
            .lines()
            .map(|line| {
                line.split_whitespace()
                    .map(|cell| cell.parse::<f64>().ok())
                    .collect::<Option<Vec<_>>>()
            })
            .filter(|row| row.as_ref().map_or(true, |r| !r.is_empty()))
            .collect(),
        Value::Array(rows) => rows
            .iter()
            .map(|row| row.as_array()?.iter().map(as_f64).collect::<Option<Vec<_>>>())
            .collect(),
        _ => None,
    }
}

/// How a property is extracted
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    /// Weighted scalar
    Attribute(AttributeRule),
    /// Weighted tables
    Series(SeriesRule),
}

/// A named, dependency-carrying output property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Stable identifier
    pub name: String,
    /// Declared requirements
    pub dependencies: Dependencies,
    /// Extraction rule
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    /// Scalar property
    #[must_use]
    pub fn attribute(name: impl Into<String>, rule: AttributeRule, deps: Dependencies) -> Self {
        Self {
            name: name.into(),
            dependencies: deps,
            kind: PropertyKind::Attribute(rule),
        }
    }

    /// Tabular property
    #[must_use]
    pub fn series(name: impl Into<String>, rule: SeriesRule, deps: Dependencies) -> Self {
        Self {
            name: name.into(),
            dependencies: deps,
            kind: PropertyKind::Series(rule),
        }
    }

    /// Zero element for accumulation
    #[must_use]
    pub fn init(&self) -> Accumulator {
        match self.kind {
            PropertyKind::Attribute(_) => Accumulator::Scalar(WeightedFloat::zero()),
            PropertyKind::Series(_) => Accumulator::Series(SeriesAccumulator::default()),
        }
    }

    /// Contribution of one stage output
    ///
    /// # Errors
    /// Missing required data or malformed documents
    pub fn accumulate(&self, output: &OutputFile) -> Result<Accumulator> {
        match &self.kind {
            PropertyKind::Attribute(rule) => rule.contribution(output).map(Accumulator::Scalar),
            PropertyKind::Series(rule) => rule.contribution(output).map(Accumulator::Series),
        }
    }
}

/// Weighted element-wise sums of named tables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesAccumulator {
    tables: BTreeMap<String, (f64, Vec<Vec<f64>>)>,
}

impl SeriesAccumulator {
    fn add(&mut self, key: String, weight: f64, rows: &[Vec<f64>]) {
        if !(weight.is_finite() && weight > 0.0) {
            return;
        }
        let weighted: Vec<Vec<f64>> = rows
            .iter()
            .map(|row| row.iter().map(|v| v * weight).collect())
            .collect();
        self.merge_table(key, weight, weighted);
    }

    fn merge_table(&mut self, key: String, weight: f64, sums: Vec<Vec<f64>>) {
        match self.tables.get_mut(&key) {
            None => {
                self.tables.insert(key, (weight, sums));
            }
            Some((total, existing)) if same_shape(existing, &sums) => {
                *total += weight;
                for (row, add) in existing.iter_mut().zip(&sums) {
                    for (cell, v) in row.iter_mut().zip(add) {
                        *cell += v;
                    }
                }
            }
            Some(_) => {
                tracing::warn!("table {} changed shape between stages, dropping a block", key);
            }
        }
    }

    fn merge(&mut self, other: Self) {
        for (key, (weight, sums)) in other.tables {
            self.merge_table(key, weight, sums);
        }
    }

    /// Weighted mean of every table
    #[must_use]
    pub fn means(&self) -> BTreeMap<String, Vec<Vec<f64>>> {
        self.tables
            .iter()
            .map(|(key, (weight, sums))| {
                let mean = sums
                    .iter()
                    .map(|row| row.iter().map(|v| v / weight).collect())
                    .collect();
                (key.clone(), mean)
            })
            .collect()
    }
}

fn same_shape(a: &[Vec<f64>], b: &[Vec<f64>]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.len() == y.len())
}

/// Running accumulation of a property across stages
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Scalar accumulation
    Scalar(WeightedFloat),
    /// Tabular accumulation
    Series(SeriesAccumulator),
}

impl Accumulator {
    /// Fold another accumulation of the same property into this one
    pub fn merge(&mut self, other: Self) {
        match (self, other) {
            (Self::Scalar(a), Self::Scalar(b)) => *a += b,
            (Self::Series(a), Self::Series(b)) => a.merge(b),
            _ => tracing::warn!("ignoring accumulation of mismatched property kinds"),
        }
    }

    /// Final value
    #[must_use]
    pub fn finish(&self) -> PropertyValue {
        match self {
            Self::Scalar(w) => w
                .estimate()
                .map_or(PropertyValue::Missing, PropertyValue::Estimate),
            Self::Series(s) => PropertyValue::Series(s.means()),
        }
    }
}

/// A finished per-state value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Weighted mean with uncertainty
    Estimate(Estimate),
    /// Plain total
    Total(f64),
    /// Weighted mean tables
    Series(BTreeMap<String, Vec<Vec<f64>>>),
    /// No stage carried weight
    Missing,
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Estimate(e) => write!(f, "{e}"),
            Self::Total(t) => write!(f, "{t}"),
            Self::Series(tables) => write!(f, "<{} tables>", tables.len()),
            Self::Missing => f.write_str("-"),
        }
    }
}

/// Registry of known properties keyed by stable name
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    properties: BTreeMap<String, PropertyDescriptor>,
}

impl PropertyRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard simulator outputs
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let scalar = |selector: &str, attribute: &str| AttributeRule::new(selector, attribute);

        registry.register(PropertyDescriptor::attribute(
            "N",
            scalar("ParticleCount", "val"),
            Dependencies::none(),
        ));
        registry.register(PropertyDescriptor::attribute(
            "p",
            scalar("Pressure", "Avg"),
            Dependencies::none(),
        ));
        registry.register(PropertyDescriptor::attribute(
            "T",
            scalar("Temperature", "Mean"),
            Dependencies::none(),
        ));
        registry.register(PropertyDescriptor::attribute(
            "density",
            scalar("Density", "val"),
            Dependencies::none(),
        ));
        registry.register(PropertyDescriptor::attribute(
            "MSD",
            scalar("MSD/Species", "diffusionCoeff").when_missing(MissingPolicy::Skip),
            Dependencies::none().run_option("-LMSD"),
        ));
        registry.register(PropertyDescriptor::series(
            "VACF",
            SeriesRule {
                selector: "VACF".into(),
                weight_attribute: "ticks".into(),
                groups: vec![
                    SeriesGroup {
                        label: "Species".into(),
                        selector: "Particles/Species".into(),
                    },
                    SeriesGroup {
                        label: "Topology".into(),
                        selector: "Topology/Structure".into(),
                    },
                ],
                name_field: "Name".into(),
                data_field: "data".into(),
            },
            Dependencies::none().run_option("-LVACF"),
        ));
        registry.register(PropertyDescriptor::attribute(
            "NeventsSO",
            scalar("EventCounters/Entry[Name=SOCells]", "Count")
                .per_particle()
                .per_time()
                .when_missing(MissingPolicy::Default(0.0)),
            Dependencies::none().state_variable("Rso"),
        ));
        registry
    }

    /// Register or replace a property
    pub fn register(&mut self, descriptor: PropertyDescriptor) {
        self.properties.insert(descriptor.name.clone(), descriptor);
    }

    /// Look up a property
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Resolve requested properties against the declared variables
    ///
    /// Dependent properties are pulled in transitively and the union of
    /// required run options is collected.
    ///
    /// # Errors
    /// - `UnknownProperty` for an unregistered name
    /// - `MissingStateVariable` when a dependency is not swept
    pub fn resolve<S: AsRef<str>>(
        &self,
        requested: &[S],
        variables: &[StateVariable],
    ) -> Result<ResolvedProperties> {
        let mut selected: BTreeMap<String, PropertyDescriptor> = BTreeMap::new();
        let mut pending: Vec<String> = requested.iter().map(|s| s.as_ref().to_string()).collect();
        let mut run_options = BTreeSet::new();

        while let Some(name) = pending.pop() {
            if selected.contains_key(&name) {
                continue;
            }
            let descriptor = self
                .properties
                .get(&name)
                .ok_or_else(|| Error::UnknownProperty(name.clone()))?;

            for var in &descriptor.dependencies.state_variables {
                if !variables.iter().any(|v| &v.name == var) {
                    return Err(Error::MissingStateVariable {
                        property: name.clone(),
                        variable: var.clone(),
                    });
                }
            }
            pending.extend(descriptor.dependencies.properties.iter().cloned());
            run_options.extend(descriptor.dependencies.run_options.iter().cloned());
            selected.insert(name, descriptor.clone());
        }

        Ok(ResolvedProperties {
            properties: selected.into_values().collect(),
            run_options: run_options.into_iter().collect(),
        })
    }
}

/// Properties validated for one campaign
#[derive(Debug, Clone, Default)]
pub struct ResolvedProperties {
    properties: Vec<PropertyDescriptor>,
    run_options: Vec<String>,
}

impl ResolvedProperties {
    /// Descriptors sorted by name
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Run options the simulator must be invoked with
    #[inline]
    #[must_use]
    pub fn run_options(&self) -> &[String] {
        &self.run_options
    }

    /// Property names sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.name.as_str())
    }
}
