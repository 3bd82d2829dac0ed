//! Result aggregation across run directories
//!
//! Every directory holding at least one complete production stage
//! contributes to the row of its (projected) state. Restarts of the same
//! state land in the same row, so their stages are weighted together.

use crate::error::Result;
use crate::property::{Accumulator, PropertyValue, ResolvedProperties};
use crate::state::{State, StateSpace};
use crate::workdir::Resolver;
use dynasweep_document::OutputFile;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};
use tracing::{debug, info, warn};

/// Column holding the summed event count
pub const EVENTS_COLUMN: &str = "NEventsTot";

/// Column holding the summed simulation time
pub const TIME_COLUMN: &str = "tTotal";

/// One aggregated state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Declared variable values
    pub state: State,
    /// Totals and property values by column name
    pub values: BTreeMap<String, PropertyValue>,
}

/// Aggregated results, one row per state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column names: variables, totals, then properties
    pub columns: Vec<String>,
    /// Rows in declared variable order
    pub rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Number of rows
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` if no state had data
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of `state`
    #[must_use]
    pub fn row(&self, state: &State) -> Option<&ResultRow> {
        self.rows.iter().find(|r| &r.state == state)
    }

    /// Value at `(state, column)`
    #[must_use]
    pub fn value(&self, state: &State, column: &str) -> Option<&PropertyValue> {
        self.row(state).and_then(|r| r.values.get(column))
    }
}

impl Display for ResultTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.columns.join("\t"))?;
        for row in &self.rows {
            let cells: Vec<String> = self
                .columns
                .iter()
                .map(|col| {
                    row.state
                        .get(col)
                        .map(ToString::to_string)
                        .or_else(|| row.values.get(col).map(ToString::to_string))
                        .unwrap_or_else(|| "-".into())
                })
                .collect();
            writeln!(f, "{}", cells.join("\t"))?;
        }
        Ok(())
    }
}

struct RowAccumulator {
    events: f64,
    time: f64,
    properties: Vec<Accumulator>,
}

/// Collects stage outputs into a [`ResultTable`]
#[derive(Debug, Clone)]
pub struct Aggregator {
    resolver: Resolver,
    space: StateSpace,
    properties: ResolvedProperties,
    only_current_values: bool,
}

impl Aggregator {
    /// Create an aggregator
    #[must_use]
    pub fn new(resolver: Resolver, space: StateSpace, properties: ResolvedProperties) -> Self {
        Self {
            resolver,
            space,
            properties,
            only_current_values: true,
        }
    }

    /// Include states with values outside the declared ones
    #[inline]
    #[must_use]
    pub fn with_only_current_values(mut self, only: bool) -> Self {
        self.only_current_values = only;
        self
    }

    fn columns(&self) -> Vec<String> {
        self.space
            .variables()
            .iter()
            .map(|v| v.name.clone())
            .chain([EVENTS_COLUMN.to_string(), TIME_COLUMN.to_string()])
            .chain(self.properties.names().map(str::to_string))
            .collect()
    }

    /// Scan the root and aggregate every complete production stage
    ///
    /// # Errors
    /// IO failures, malformed stage documents, or missing data for a
    /// property that does not tolerate it
    pub fn collect(&self) -> Result<ResultTable> {
        let files = self.resolver.files();
        let mut rows: HashMap<State, RowAccumulator> = HashMap::new();

        for dir in self.resolver.run_dirs()? {
            let stages = files.production_stages(&dir);
            if stages == 0 {
                debug!("{} has no complete production stage", dir.display());
                continue;
            }
            let snapshot = match self.resolver.read_snapshot(&dir) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    warn!("{} has data but no state snapshot, ignoring", dir.display());
                    continue;
                }
                Err(e) => {
                    warn!("ignoring {}: {}", dir.display(), e);
                    continue;
                }
            };
            let state = snapshot.state.project(self.space.variables());
            if self.only_current_values && !self.space.contains(&state) {
                debug!("{} is outside the declared values", state);
                continue;
            }

            let row = rows.entry(state).or_insert_with(|| RowAccumulator {
                events: 0.0,
                time: 0.0,
                properties: self.properties.properties().iter().map(|p| p.init()).collect(),
            });
            for stage in 1..=stages {
                let output = OutputFile::open(files.data(&dir, stage))?;
                row.events += output.events()?;
                row.time += output.time()?;
                for (acc, property) in row.properties.iter_mut().zip(self.properties.properties())
                {
                    acc.merge(property.accumulate(&output)?);
                }
            }
        }

        let mut table_rows: Vec<ResultRow> = rows
            .into_iter()
            .map(|(state, acc)| {
                let mut values = BTreeMap::new();
                values.insert(EVENTS_COLUMN.to_string(), PropertyValue::Total(acc.events));
                values.insert(TIME_COLUMN.to_string(), PropertyValue::Total(acc.time));
                for (property, value) in self.properties.properties().iter().zip(&acc.properties) {
                    values.insert(property.name.clone(), value.finish());
                }
                ResultRow { state, values }
            })
            .collect();
        table_rows.sort_by(|a, b| a.state.cmp_by(&b.state, self.space.variables()));

        info!("aggregated {} state(s)", table_rows.len());
        Ok(ResultTable {
            columns: self.columns(),
            rows: table_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyRegistry;
    use crate::state::{StateValue, StateVariable};
    use crate::workdir::{StageFiles, StateSnapshot};
    use dynasweep_document::document::write_value;
    use serde_json::json;
    use std::path::Path;

    fn stage(files: StageFiles, dir: &Path, k: u32, pressure: f64, time: f64) {
        write_value(&files.config(dir, k), &json!({ "ParticleData": { "Pt": [{}] } })).unwrap();
        write_value(
            &files.data(dir, k),
            &json!({
                "Misc": {
                    "ParticleCount": { "val": 1 },
                    "Duration": { "Events": 100, "Time": time },
                    "Pressure": { "Avg": pressure }
                }
            }),
        )
        .unwrap();
    }

    fn run_dir(resolver: &Resolver, state: &State, restart: u32) -> std::path::PathBuf {
        let dir = resolver.resolve(state, restart).unwrap();
        std::fs::create_dir_all(&dir).unwrap();
        resolver
            .write_snapshot(&dir, &StateSnapshot::new(state.clone(), restart))
            .unwrap();
        dir
    }

    #[test]
    fn restarts_merge_and_rows_sort() {
        let root = tempfile::tempdir().unwrap();
        let files = StageFiles::new(false);
        let resolver = Resolver::new(root.path(), files);
        let vars = vec![StateVariable::new(
            "N",
            [StateValue::Int(2), StateValue::Int(10)],
        )];
        let ten = State::from_pairs([("N", StateValue::Int(10))]);
        let two = State::from_pairs([("N", StateValue::Int(2))]);

        let a = run_dir(&resolver, &ten, 0);
        stage(files, &a, 0, 100.0, 1.0);
        stage(files, &a, 1, 2.0, 10.0);
        let b = run_dir(&resolver, &ten, 1);
        stage(files, &b, 0, 100.0, 1.0);
        stage(files, &b, 1, 4.0, 30.0);
        let c = run_dir(&resolver, &two, 0);
        stage(files, &c, 0, 1.0, 1.0);

        let props = PropertyRegistry::with_defaults().resolve(&["p"], &vars).unwrap();
        let space = StateSpace::new(vars, 1).unwrap();
        let table = Aggregator::new(resolver, space, props).collect().unwrap();

        assert_eq!(table.columns, vec!["N", "NEventsTot", "tTotal", "p"]);
        assert_eq!(table.len(), 1, "equilibration-only directories are ignored");
        match table.value(&ten, "p") {
            Some(PropertyValue::Estimate(e)) => assert_eq!(e.value, 3.5),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(table.value(&ten, TIME_COLUMN), Some(&PropertyValue::Total(40.0)));
        assert_eq!(table.value(&ten, EVENTS_COLUMN), Some(&PropertyValue::Total(200.0)));

        let tsv = table.to_string();
        assert!(tsv.starts_with("N\tNEventsTot\ttTotal\tp\n10\t200\t40\t3.5"));
    }

    #[test]
    fn stale_values_are_filtered() {
        let root = tempfile::tempdir().unwrap();
        let files = StageFiles::new(true);
        let resolver = Resolver::new(root.path(), files);
        let old = State::from_pairs([("N", StateValue::Int(7))]);
        let dir = run_dir(&resolver, &old, 0);
        stage(files, &dir, 1, 1.0, 1.0);

        let space = StateSpace::new(vec![StateVariable::new("N", [StateValue::Int(8)])], 1).unwrap();
        let props = ResolvedProperties::default();

        let current = Aggregator::new(resolver.clone(), space.clone(), props.clone());
        assert!(current.collect().unwrap().is_empty());

        let everything = Aggregator::new(resolver, space, props).with_only_current_values(false);
        assert_eq!(everything.collect().unwrap().len(), 1);
    }

    #[test]
    fn empty_root_gives_empty_table() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(root.path().join("absent"), StageFiles::new(true));
        let space = StateSpace::new(Vec::new(), 1).unwrap();
        let table = Aggregator::new(resolver, space, ResolvedProperties::default())
            .collect()
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.to_string(), "NEventsTot\ttTotal\n");
    }
}
