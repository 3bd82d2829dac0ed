//! Mapping from sweep points to run directories
//!
//! Each `(state, restart)` owns one directory under the campaign root named
//! `<signature>_<restart>`. Distinct states may share a signature (text
//! `"1"` against integer `1`), so a persisted [`StateSnapshot`] inside
//! every directory is the authority: a `-<k>` suffix disambiguates, and a
//! directory is only reused when its snapshot matches.
//!
//! [`Resolver::reconcile`] re-derives snapshots of existing directories and
//! moves them to their canonical names after the variable set changes.

use crate::error::{Error, Result};
use crate::state::{State, StateSpace, StateVariable};
use crate::variable::{Derivation, VariableCatalog};
use dynasweep_document::{validate, Compression, ConfigFile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted identity of a run directory
pub const SNAPSHOT_FILE: &str = "state.json";

/// Human-readable per-directory log
pub const RUN_LOG_FILE: &str = "run.log";

/// State and restart index stored in every run directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Variable values
    pub state: State,
    /// Restart index
    pub restart: u32,
}

impl StateSnapshot {
    /// Create a snapshot
    #[inline]
    #[must_use]
    pub fn new(state: State, restart: u32) -> Self {
        Self { state, restart }
    }
}

/// One unit of scheduled work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Sweep point
    pub state: State,
    /// Restart index
    pub restart: u32,
    /// Owned run directory
    pub dir: PathBuf,
}

impl WorkItem {
    /// Snapshot identifying this item
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::new(self.state.clone(), self.restart)
    }

    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> String {
        self.dir
            .file_name()
            .map_or_else(|| self.dir.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// Stage file naming inside a run directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFiles {
    compression: Compression,
}

impl StageFiles {
    /// Naming for compressed (`.json.gz`) or plain (`.json`) documents
    #[inline]
    #[must_use]
    pub fn new(compress: bool) -> Self {
        Self {
            compression: if compress {
                Compression::Gzip
            } else {
                Compression::None
            },
        }
    }

    /// Document compression in use
    #[inline]
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Initial configuration produced by setup
    #[must_use]
    pub fn start_config(&self, dir: &Path) -> PathBuf {
        dir.join(format!("start.config.{}", self.compression.extension()))
    }

    /// Final configuration of stage `stage`
    #[must_use]
    pub fn config(&self, dir: &Path, stage: u32) -> PathBuf {
        dir.join(format!("{stage}.config.{}", self.compression.extension()))
    }

    /// Measurement output of stage `stage`
    #[must_use]
    pub fn data(&self, dir: &Path, stage: u32) -> PathBuf {
        dir.join(format!("{stage}.data.{}", self.compression.extension()))
    }

    /// Configuration stage `stage` starts from
    #[must_use]
    pub fn input(&self, dir: &Path, stage: u32) -> PathBuf {
        match stage.checked_sub(1) {
            Some(prev) => self.config(dir, prev),
            None => self.start_config(dir),
        }
    }

    /// Both documents of the stage exist and parse
    #[must_use]
    pub fn is_complete(&self, dir: &Path, stage: u32) -> bool {
        validate(self.config(dir, stage)) && validate(self.data(dir, stage))
    }

    /// Number of consecutive complete production stages (1, 2, ...)
    #[must_use]
    pub fn production_stages(&self, dir: &Path) -> u32 {
        (1..).take_while(|&k| self.is_complete(dir, k)).count() as u32
    }
}

/// How reconciliation treats a persisted value that disagrees with the
/// value re-derived from the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    /// Re-derived value wins, with a warning
    #[default]
    Override,
    /// Leave the directory untouched and report a conflict
    Reject,
}

/// Outcome of a reconciliation pass
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Directories with usable configurations
    pub examined: usize,
    /// Directories whose snapshot was rewritten in place
    pub rewritten: Vec<PathBuf>,
    /// `(from, to)` renames
    pub moved: Vec<(PathBuf, PathBuf)>,
    /// Directories ignored for lack of a valid configuration
    pub skipped: Vec<PathBuf>,
    /// Directories left alone because of a conflict
    pub conflicts: Vec<Error>,
}

impl ReconcileReport {
    /// `true` if nothing on disk changed
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.rewritten.is_empty() && self.moved.is_empty()
    }
}

/// Run directory resolver for one campaign root
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    files: StageFiles,
}

impl Resolver {
    /// Create a resolver
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, files: StageFiles) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    /// Campaign root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stage file naming
    #[inline]
    #[must_use]
    pub fn files(&self) -> StageFiles {
        self.files
    }

    /// Directory name for disambiguator `k`
    #[must_use]
    pub fn dir_name(state: &State, restart: u32, k: u32) -> String {
        let base = format!("{}_{restart}", state.signature());
        if k == 0 {
            base
        } else {
            format!("{base}-{k}")
        }
    }

    /// Directory for `(state, restart)`
    ///
    /// Any existing `<signature>_<restart>[-k]` directory whose snapshot
    /// matches wins, whatever its `k`. Otherwise the lowest slot that is
    /// free, or an empty directory left without a snapshot.
    ///
    /// # Errors
    /// IO failures while scanning the root, or an exhausted disambiguator
    /// space
    pub fn resolve(&self, state: &State, restart: u32) -> Result<PathBuf> {
        self.resolve_excluding(state, restart, &HashSet::new())
    }

    fn resolve_excluding(
        &self,
        state: &State,
        restart: u32,
        claimed: &HashSet<PathBuf>,
    ) -> Result<PathBuf> {
        let wanted = StateSnapshot::new(state.clone(), restart);
        let base = Self::dir_name(state, restart, 0);

        let mut slots: Vec<(u32, PathBuf)> = self
            .run_dirs()?
            .into_iter()
            .filter_map(|dir| {
                let k = dir
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| slot_index(n, &base))?;
                Some((k, dir))
            })
            .collect();
        slots.sort_by_key(|(k, _)| *k);

        for (_, dir) in &slots {
            if claimed.contains(dir) {
                continue;
            }
            match self.read_snapshot(dir) {
                Ok(Some(found)) if found == wanted => return Ok(dir.clone()),
                Ok(_) => {}
                Err(e) => debug!("ignoring unreadable snapshot: {}", e),
            }
        }

        for k in 0..u32::MAX {
            let path = self.root.join(Self::dir_name(state, restart, k));
            if claimed.contains(&path) {
                continue;
            }
            if !path.exists() || is_abandoned(&path) {
                return Ok(path);
            }
        }
        Err(Error::Configuration(format!(
            "no free directory for {state} restart {restart}"
        )))
    }

    /// Work items for every point of the space
    ///
    /// Points that share a signature but differ in value get distinct
    /// directories even before any of them exists on disk.
    ///
    /// # Errors
    /// See [`resolve`](Self::resolve)
    pub fn items(&self, space: &StateSpace) -> Result<Vec<WorkItem>> {
        let mut claimed = HashSet::new();
        space
            .points()
            .into_iter()
            .map(|(state, restart)| {
                let dir = self.resolve_excluding(&state, restart, &claimed)?;
                claimed.insert(dir.clone());
                Ok(WorkItem {
                    state,
                    restart,
                    dir,
                })
            })
            .collect()
    }

    /// Persisted snapshot of `dir`, `None` if there is none
    ///
    /// # Errors
    /// `Snapshot` if the file exists but cannot be decoded
    pub fn read_snapshot(&self, dir: &Path) -> Result<Option<StateSnapshot>> {
        let path = dir.join(SNAPSHOT_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Snapshot {
                path,
                message: e.to_string(),
            })
    }

    /// Atomically persist `snapshot` into `dir`
    ///
    /// # Errors
    /// IO failures
    pub fn write_snapshot(&self, dir: &Path, snapshot: &StateSnapshot) -> Result<()> {
        let path = dir.join(SNAPSHOT_FILE);
        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| Error::Snapshot {
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::io(&path, e))
    }

    /// Create the item's directory and snapshot if missing
    ///
    /// # Errors
    /// IO failures, or a directory that belongs to another snapshot
    pub fn ensure_created(&self, item: &WorkItem) -> Result<()> {
        fs::create_dir_all(&item.dir).map_err(|e| Error::io(&item.dir, e))?;
        let wanted = item.snapshot();
        match self.read_snapshot(&item.dir)? {
            Some(found) if found == wanted => Ok(()),
            Some(found) => Err(Error::Snapshot {
                path: item.dir.join(SNAPSHOT_FILE),
                message: format!(
                    "directory belongs to {} restart {}",
                    found.state, found.restart
                ),
            }),
            None => self.write_snapshot(&item.dir, &wanted),
        }
    }

    /// Subdirectories of the root, sorted by name
    ///
    /// # Errors
    /// IO failures other than a missing root
    pub fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.root, e)),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.root, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Re-derive every directory's snapshot and move it to its canonical
    /// name
    ///
    /// Runs in two phases: all snapshots are recomputed first, then
    /// directories already at a canonical name for their snapshot are kept
    /// and the rest are renamed to the lowest free name. Running it again
    /// changes nothing.
    ///
    /// # Errors
    /// IO failures while rewriting or renaming
    pub fn reconcile(
        &self,
        variables: &[StateVariable],
        catalog: &VariableCatalog,
        policy: MismatchPolicy,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut planned = Vec::new();

        for dir in self.run_dirs()? {
            let config_path = if self.files.is_complete(&dir, 0) {
                self.files.config(&dir, 0)
            } else if validate(self.files.start_config(&dir)) {
                self.files.start_config(&dir)
            } else {
                debug!("no usable configuration in {}, skipping", dir.display());
                report.skipped.push(dir);
                continue;
            };
            report.examined += 1;

            let persisted = match self.read_snapshot(&dir) {
                Ok(found) => found,
                Err(e) => {
                    warn!("discarding unreadable snapshot: {}", e);
                    None
                }
            };
            match rederive(&dir, &config_path, persisted.as_ref(), variables, catalog, policy) {
                Ok(snapshot) => planned.push((dir, persisted, snapshot)),
                Err(e) => {
                    warn!("{}", e);
                    report.conflicts.push(e);
                }
            }
        }

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        let mut relocate = Vec::new();
        for (dir, persisted, snapshot) in planned {
            if is_canonical(&dir, &snapshot) {
                if persisted.as_ref() != Some(&snapshot) {
                    self.write_snapshot(&dir, &snapshot)?;
                    report.rewritten.push(dir.clone());
                }
                claimed.insert(dir);
            } else {
                relocate.push((dir, snapshot));
            }
        }

        for (dir, snapshot) in relocate {
            let target = (0..u32::MAX)
                .map(|k| {
                    self.root
                        .join(Self::dir_name(&snapshot.state, snapshot.restart, k))
                })
                .find(|p| !claimed.contains(p) && !p.exists())
                .ok_or_else(|| Error::Reconcile {
                    dir: dir.clone(),
                    reason: "no free canonical name".into(),
                })?;
            self.write_snapshot(&dir, &snapshot)?;
            fs::rename(&dir, &target).map_err(|e| Error::io(&dir, e))?;
            info!("moved {} -> {}", dir.display(), target.display());
            claimed.insert(target.clone());
            report.moved.push((dir, target));
        }

        Ok(report)
    }
}

/// Disambiguator of `name` if it is `base` (0) or `base-<k>` with `k > 0`
fn slot_index(name: &str, base: &str) -> Option<u32> {
    match name.strip_prefix(base)? {
        "" => Some(0),
        rest => rest
            .strip_prefix('-')
            .and_then(|k| k.parse::<u32>().ok())
            .filter(|k| *k > 0),
    }
}

fn is_canonical(dir: &Path, snapshot: &StateSnapshot) -> bool {
    let base = Resolver::dir_name(&snapshot.state, snapshot.restart, 0);
    dir.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| slot_index(n, &base))
        .is_some()
}

/// A directory created but never given a snapshot (interrupted before
/// `ensure_created` finished): empty apart from a stale snapshot temp file
fn is_abandoned(dir: &Path) -> bool {
    if !dir.is_dir() || dir.join(SNAPSHOT_FILE).exists() {
        return false;
    }
    let tmp = format!("{SNAPSHOT_FILE}.tmp");
    fs::read_dir(dir).is_ok_and(|mut entries| {
        entries.all(|e| e.is_ok_and(|e| e.file_name().to_str() == Some(tmp.as_str())))
    })
}

fn rederive(
    dir: &Path,
    config_path: &Path,
    persisted: Option<&StateSnapshot>,
    variables: &[StateVariable],
    catalog: &VariableCatalog,
    policy: MismatchPolicy,
) -> Result<StateSnapshot> {
    let config = ConfigFile::open(config_path)?;
    let mut state = State::new();

    for var in variables {
        let old = persisted.and_then(|s| s.state.get(&var.name));
        match catalog.get(&var.name) {
            Some(Derivation::FromConfig(query)) => {
                let derived = query.evaluate(&config)?;
                if let Some(old) = old.filter(|old| **old != derived) {
                    match policy {
                        MismatchPolicy::Override => warn!(
                            "{}: {} was {} but the configuration says {}, overriding",
                            dir.display(),
                            var.name,
                            old,
                            derived
                        ),
                        MismatchPolicy::Reject => {
                            return Err(Error::Reconcile {
                                dir: dir.to_path_buf(),
                                reason: format!(
                                    "{} was {} but the configuration says {}",
                                    var.name, old, derived
                                ),
                            })
                        }
                    }
                }
                state.insert(var.name.clone(), derived);
            }
            Some(Derivation::Fallback(fallback)) => {
                state.insert(var.name.clone(), old.unwrap_or(fallback).clone());
            }
            None => {
                if let Some(old) = old {
                    state.insert(var.name.clone(), old.clone());
                }
            }
        }
    }

    let restart = persisted.map_or(0, |s| s.restart);
    Ok(StateSnapshot::new(state, restart))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateValue;
    use dynasweep_document::document::write_value;
    use serde_json::json;

    fn state(pairs: &[(&str, StateValue)]) -> State {
        State::from_pairs(pairs.iter().cloned())
    }

    fn write_config(path: &Path, particles: usize, side: f64) {
        let pts: Vec<_> = (0..particles).map(|_| json!({})).collect();
        write_value(
            path,
            &json!({
                "SimulationSize": { "x": side, "y": side, "z": side },
                "ParticleData": { "Pt": pts }
            }),
        )
        .unwrap();
    }

    #[test]
    fn stage_file_names() {
        let files = StageFiles::new(true);
        let dir = Path::new("/r/N_4_0");
        assert_eq!(files.start_config(dir), Path::new("/r/N_4_0/start.config.json.gz"));
        assert_eq!(files.input(dir, 0), files.start_config(dir));
        assert_eq!(files.input(dir, 3), Path::new("/r/N_4_0/2.config.json.gz"));
        assert_eq!(
            StageFiles::new(false).data(dir, 1),
            Path::new("/r/N_4_0/1.data.json")
        );
    }

    #[test]
    fn dir_names() {
        let s = state(&[("N", StateValue::Int(4)), ("ndensity", StateValue::float(0.5))]);
        assert_eq!(Resolver::dir_name(&s, 0, 0), "N_4_ndensity_0.5_0");
        assert_eq!(Resolver::dir_name(&s, 2, 3), "N_4_ndensity_0.5_2-3");
    }

    #[test]
    fn resolve_reuses_matching_snapshot_and_skips_foreign_one() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(root.path(), StageFiles::new(false));
        let number = state(&[("x", StateValue::Int(1))]);
        let text = state(&[("x", StateValue::text("1"))]);

        let first = WorkItem {
            dir: resolver.resolve(&number, 0).unwrap(),
            state: number.clone(),
            restart: 0,
        };
        resolver.ensure_created(&first).unwrap();
        assert_eq!(resolver.resolve(&number, 0).unwrap(), first.dir);

        let other = resolver.resolve(&text, 0).unwrap();
        assert_ne!(other, first.dir);
        assert!(other.ends_with("x_1_0-1"));
    }

    #[test]
    fn ensure_created_refuses_foreign_directory() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(root.path(), StageFiles::new(false));
        let a = state(&[("x", StateValue::Int(1))]);
        let dir = root.path().join("x_1_0");
        fs::create_dir_all(&dir).unwrap();
        resolver
            .write_snapshot(&dir, &StateSnapshot::new(state(&[("x", StateValue::text("1"))]), 0))
            .unwrap();

        let item = WorkItem {
            state: a,
            restart: 0,
            dir,
        };
        assert!(matches!(
            resolver.ensure_created(&item),
            Err(Error::Snapshot { .. })
        ));
    }

    #[test]
    fn reconcile_rederives_and_moves() {
        let root = tempfile::tempdir().unwrap();
        let files = StageFiles::new(true);
        let resolver = Resolver::new(root.path(), files);

        // A directory from a campaign that only swept N.
        let old = root.path().join("N_8_0");
        fs::create_dir_all(&old).unwrap();
        resolver
            .write_snapshot(&old, &StateSnapshot::new(state(&[("N", StateValue::Int(8))]), 0))
            .unwrap();
        write_config(&files.start_config(&old), 8, 2.0);

        let vars = vec![
            StateVariable::new("N", [StateValue::Int(8)]),
            StateVariable::new("ndensity", [StateValue::float(1.0)]),
            StateVariable::new("InitState", [StateValue::text("FCC")]),
        ];
        let catalog = VariableCatalog::with_defaults();
        let report = resolver
            .reconcile(&vars, &catalog, MismatchPolicy::Override)
            .unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.moved.len(), 1);
        let target = root.path().join("N_8_ndensity_1_InitState_FCC_0");
        assert_eq!(report.moved[0].1, target);
        let snapshot = resolver.read_snapshot(&target).unwrap().unwrap();
        assert_eq!(snapshot.state.get("InitState"), Some(&StateValue::text("FCC")));

        let again = resolver
            .reconcile(&vars, &catalog, MismatchPolicy::Override)
            .unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn reject_policy_leaves_mismatches_alone() {
        let root = tempfile::tempdir().unwrap();
        let files = StageFiles::new(false);
        let resolver = Resolver::new(root.path(), files);

        let dir = root.path().join("N_4_0");
        fs::create_dir_all(&dir).unwrap();
        resolver
            .write_snapshot(&dir, &StateSnapshot::new(state(&[("N", StateValue::Int(4))]), 0))
            .unwrap();
        write_config(&files.start_config(&dir), 5, 1.0);

        let vars = vec![StateVariable::new("N", [StateValue::Int(4)])];
        let report = resolver
            .reconcile(&vars, &VariableCatalog::with_defaults(), MismatchPolicy::Reject)
            .unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.is_noop());
        assert!(dir.exists());
    }

    #[test]
    fn directories_without_configuration_are_skipped() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(root.path(), StageFiles::new(true));
        fs::create_dir_all(root.path().join("junk")).unwrap();

        let report = resolver
            .reconcile(&[], &VariableCatalog::new(), MismatchPolicy::Override)
            .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.examined, 0);
    }

    #[test]
    fn suffixed_owner_is_found_after_base_is_vacated() {
        let root = tempfile::tempdir().unwrap();
        let files = StageFiles::new(true);
        let resolver = Resolver::new(root.path(), files);
        let number = state(&[("x", StateValue::Int(1))]);

        // The text twin that once held x_1_0 has been moved away
        let dir = root.path().join("x_1_0-1");
        fs::create_dir_all(&dir).unwrap();
        resolver
            .write_snapshot(&dir, &StateSnapshot::new(number.clone(), 0))
            .unwrap();
        write_config(&files.start_config(&dir), 2, 1.0);

        let vars = vec![StateVariable::new("x", [StateValue::Int(1)])];
        let report = resolver
            .reconcile(&vars, &VariableCatalog::with_defaults(), MismatchPolicy::Override)
            .unwrap();
        assert!(report.is_noop());

        assert_eq!(resolver.resolve(&number, 0).unwrap(), dir);
        let space = StateSpace::new(vars, 1).unwrap();
        assert_eq!(resolver.items(&space).unwrap()[0].dir, dir);
        assert!(!root.path().join("x_1_0").exists());
    }

    #[test]
    fn directory_without_snapshot_is_reclaimed_only_when_empty() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(root.path(), StageFiles::new(false));
        let number = state(&[("x", StateValue::Int(1))]);

        // Interrupted between mkdir and the snapshot write
        let base = root.path().join("x_1_0");
        fs::create_dir_all(&base).unwrap();
        fs::write(base.join("state.json.tmp"), b"{").unwrap();
        assert_eq!(resolver.resolve(&number, 0).unwrap(), base);

        let item = WorkItem {
            state: number.clone(),
            restart: 0,
            dir: base.clone(),
        };
        resolver.ensure_created(&item).unwrap();
        assert_eq!(resolver.read_snapshot(&base).unwrap(), Some(item.snapshot()));

        // Unknown content without a snapshot is left alone
        let other = state(&[("y", StateValue::Int(2))]);
        let foreign = root.path().join("y_2_0");
        fs::create_dir_all(&foreign).unwrap();
        fs::write(foreign.join("notes.txt"), b"keep").unwrap();
        assert_eq!(
            resolver.resolve(&other, 0).unwrap(),
            root.path().join("y_2_0-1")
        );
    }

    #[test]
    fn canonical_names() {
        let snap = StateSnapshot::new(state(&[("x", StateValue::Int(1))]), 0);
        assert!(is_canonical(Path::new("/r/x_1_0"), &snap));
        assert!(is_canonical(Path::new("/r/x_1_0-2"), &snap));
        assert!(!is_canonical(Path::new("/r/x_1_0-0"), &snap));
        assert!(!is_canonical(Path::new("/r/x_1_1"), &snap));
        assert!(!is_canonical(Path::new("/r/x_1_0-a"), &snap));
    }
}
