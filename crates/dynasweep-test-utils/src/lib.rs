//! Testing utilities for the dynasweep workspace
//!
//! [`FakeSimulator`] stands in for the external setup and run programs. It
//! writes small but well-formed documents in-process and records every
//! call, so tests can assert on exactly which stages were simulated.

#![allow(missing_docs)]

use dynasweep_core::{
    Error, Result, RunLog, RunRequest, SetupOutcome, SetupRequest, Simulator, State, StateValue,
};
use dynasweep_document::document::write_value;
use dynasweep_document::{ConfigFile, Document};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type StatePredicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;
type StageValue = Arc<dyn Fn(&State, u32) -> f64 + Send + Sync>;

/// Particle count used when the state does not set `N`
pub const DEFAULT_PARTICLES: u64 = 4;

/// One recorded `run` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Run directory
    pub dir: PathBuf,
    /// Stage produced
    pub stage: u32,
    /// Events requested
    pub events: u64,
    /// Options passed
    pub options: Vec<String>,
}

#[derive(Default)]
struct Calls {
    setups: Vec<State>,
    runs: Vec<RunRecord>,
}

/// In-process simulator writing JSON documents
#[derive(Clone)]
pub struct FakeSimulator {
    calls: Arc<Mutex<Calls>>,
    skip: StatePredicate,
    fail: StatePredicate,
    corrupt: StatePredicate,
    pressure: StageValue,
    time: Option<StageValue>,
    missing_tool: Option<String>,
}

impl Default for FakeSimulator {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            skip: Arc::new(|_| false),
            fail: Arc::new(|_| false),
            corrupt: Arc::new(|_| false),
            pressure: Arc::new(|_, _| 1.0),
            time: None,
            missing_tool: None,
        }
    }
}

impl std::fmt::Debug for FakeSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let calls = self.calls.lock();
        f.debug_struct("FakeSimulator")
            .field("setups", &calls.setups.len())
            .field("runs", &calls.runs.len())
            .finish_non_exhaustive()
    }
}

impl FakeSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Setup declines states matching `pred`
    pub fn skip_when(mut self, pred: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        self.skip = Arc::new(pred);
        self
    }

    /// Runs of states matching `pred` fail like a crashed process
    pub fn fail_when(mut self, pred: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        self.fail = Arc::new(pred);
        self
    }

    /// Runs of states matching `pred` exit cleanly but leave a truncated
    /// data document behind
    pub fn corrupt_when(mut self, pred: impl Fn(&State) -> bool + Send + Sync + 'static) -> Self {
        self.corrupt = Arc::new(pred);
        self
    }

    /// Pressure written for `(state, stage)`
    pub fn with_pressure(
        mut self,
        f: impl Fn(&State, u32) -> f64 + Send + Sync + 'static,
    ) -> Self {
        self.pressure = Arc::new(f);
        self
    }

    /// Elapsed time written for `(state, stage)`; defaults to
    /// `events / N / 100`
    pub fn with_time(mut self, f: impl Fn(&State, u32) -> f64 + Send + Sync + 'static) -> Self {
        self.time = Some(Arc::new(f));
        self
    }

    /// Report `tool` as missing from `check_available`
    pub fn with_missing_tool(mut self, tool: impl Into<String>) -> Self {
        self.missing_tool = Some(tool.into());
        self
    }

    /// Number of setup calls so far
    pub fn setup_count(&self) -> usize {
        self.calls.lock().setups.len()
    }

    /// Every run call so far, in call order
    pub fn runs(&self) -> Vec<RunRecord> {
        self.calls.lock().runs.clone()
    }

    /// Run calls that targeted `dir`
    pub fn runs_in(&self, dir: &Path) -> Vec<RunRecord> {
        self.calls
            .lock()
            .runs
            .iter()
            .filter(|r| r.dir == dir)
            .cloned()
            .collect()
    }

    /// Forget recorded calls
    pub fn reset(&self) {
        *self.calls.lock() = Calls::default();
    }
}

impl Simulator for FakeSimulator {
    fn check_available(&self) -> Result<()> {
        match &self.missing_tool {
            Some(tool) => Err(Error::MissingTool(tool.clone())),
            None => Ok(()),
        }
    }

    fn setup(&self, request: &SetupRequest, log: &mut RunLog) -> SetupOutcome {
        self.calls.lock().setups.push(request.state.clone());
        if (self.skip)(&request.state) {
            return SetupOutcome::Skipped;
        }
        let _ = log.line(format!("fake setup for {}", request.state));

        let particles = match request.state.get("N") {
            Some(StateValue::Int(n)) => u64::try_from(*n).unwrap_or(DEFAULT_PARTICLES),
            _ => DEFAULT_PARTICLES,
        };
        let density = request
            .state
            .get("ndensity")
            .and_then(StateValue::as_f64)
            .unwrap_or(1.0);
        match write_value(&request.target, &config_document(&request.state, particles, density)) {
            Ok(()) => SetupOutcome::Created(request.target.clone()),
            Err(e) => SetupOutcome::Failed(e.to_string()),
        }
    }

    fn run(&self, request: &RunRequest, log: &mut RunLog) -> Result<()> {
        let input = Document::open(&request.input)?;
        let state: State = input
            .root()
            .pointer("/Fake/state")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        let stage = stage_of(&request.output).unwrap_or(0);
        let dir = request
            .output
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        self.calls.lock().runs.push(RunRecord {
            dir,
            stage,
            events: request.events,
            options: request.options.clone(),
        });

        if (self.fail)(&state) {
            log.line("fake run crashed")?;
            return Err(Error::ExternalProcess {
                command: format!("fake-run {}", request.input.display()),
                log: log.path().to_path_buf(),
                status: "exit status: 1".into(),
            });
        }

        let particles = ConfigFile::from_document(input.clone()).particle_count()?.max(1);
        let time = match &self.time {
            Some(f) => f(&state, stage),
            None => request.events as f64 / particles as f64 / 100.0,
        };
        input.save(&request.output)?;
        if (self.corrupt)(&state) {
            std::fs::write(&request.data, b"{\"Misc\": {")
                .map_err(|e| Error::io(&request.data, e))?;
            return Ok(());
        }
        write_value(
            &request.data,
            &json!({
                "Misc": {
                    "ParticleCount": { "val": particles },
                    "Duration": { "Events": request.events, "Time": time },
                    "Pressure": { "Avg": (self.pressure)(&state, stage) },
                    "Temperature": { "Mean": 1.0 },
                    "Density": { "val": 1.0 }
                }
            }),
        )?;
        log.line(format!("fake run produced stage {stage}"))?;
        Ok(())
    }
}

/// Stage number from a `<k>.config.*` or `<k>.data.*` file name
pub fn stage_of(path: &Path) -> Option<u32> {
    path.file_name()?
        .to_str()?
        .split('.')
        .next()?
        .parse()
        .ok()
}

/// Configuration document holding `particles` at `density`
pub fn config_document(state: &State, particles: u64, density: f64) -> Value {
    let side = (particles as f64 / density).cbrt();
    let pts: Vec<Value> = (0..particles).map(|i| json!({ "ID": i })).collect();
    json!({
        "SimulationSize": { "x": side, "y": side, "z": side },
        "ParticleData": { "Pt": pts },
        "Fake": { "state": serde_json::to_value(state).unwrap_or(Value::Null) }
    })
}

/// State from `(name, value)` pairs
pub fn state<const N: usize>(pairs: [(&str, StateValue); N]) -> State {
    State::from_pairs(pairs)
}
