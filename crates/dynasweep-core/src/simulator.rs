//! Simulator collaborator interface
//!
//! The campaign never simulates anything itself. It asks a [`Simulator`]
//! for two services:
//! - produce an initial configuration for a state ([`Simulator::setup`])
//! - advance a configuration by a number of events ([`Simulator::run`])
//!
//! [`ProcessSimulator`] implements both by spawning external executables
//! whose output is appended to the run directory's [`RunLog`].

use crate::config::ProcessSimulatorConfig;
use crate::error::{Error, Result};
use crate::state::State;
use crate::workdir::RUN_LOG_FILE;
use chrono::Local;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Request to create an initial configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SetupRequest {
    /// Where the configuration must be written
    pub target: PathBuf,
    /// Equilibration budget in events per particle
    pub events: u64,
    /// State the configuration must realise
    pub state: State,
}

/// Request to advance a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Starting configuration
    pub input: PathBuf,
    /// Final configuration to write
    pub output: PathBuf,
    /// Measurement output to write
    pub data: PathBuf,
    /// Events to execute
    pub events: u64,
    /// Extra simulator options (measurement plugins)
    pub options: Vec<String>,
}

/// Result of a setup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    /// Configuration written to the path
    Created(PathBuf),
    /// The state cannot be realised; not an error
    Skipped,
    /// Setup failed
    Failed(String),
}

/// External simulation services
pub trait Simulator: Send + Sync {
    /// Verify every required tool is available
    ///
    /// # Errors
    /// `MissingTool` naming the first missing executable
    fn check_available(&self) -> Result<()>;

    /// Create an initial configuration
    fn setup(&self, request: &SetupRequest, log: &mut RunLog) -> SetupOutcome;

    /// Advance a configuration, writing the final configuration and
    /// measurement output
    ///
    /// # Errors
    /// `ExternalProcess` when the simulation fails
    fn run(&self, request: &RunRequest, log: &mut RunLog) -> Result<()>;
}

/// Append-only human-readable log of one run directory
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Open (creating if needed) `run.log` in `dir`
    ///
    /// # Errors
    /// IO failures
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(RUN_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;
        Ok(Self { path, file })
    }

    /// Log file location
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a timestamped banner line
    ///
    /// # Errors
    /// IO failures
    pub fn banner(&mut self, message: impl Display) -> Result<()> {
        writeln!(
            self.file,
            "==== {} {} ====",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        )
        .map_err(|e| Error::io(&self.path, e))
    }

    /// Append a plain line
    ///
    /// # Errors
    /// IO failures
    pub fn line(&mut self, message: impl Display) -> Result<()> {
        writeln!(self.file, "{message}").map_err(|e| Error::io(&self.path, e))
    }

    /// Handles redirecting a child's stdout and stderr into the log
    ///
    /// # Errors
    /// IO failures duplicating the handle
    pub fn stdio(&self) -> Result<(Stdio, Stdio)> {
        let out = self.file.try_clone().map_err(|e| Error::io(&self.path, e))?;
        let err = self.file.try_clone().map_err(|e| Error::io(&self.path, e))?;
        Ok((Stdio::from(out), Stdio::from(err)))
    }
}

/// Simulator backed by external setup and run executables
#[derive(Debug, Clone)]
pub struct ProcessSimulator {
    config: ProcessSimulatorConfig,
}

impl ProcessSimulator {
    /// Create from configuration
    #[inline]
    #[must_use]
    pub fn new(config: ProcessSimulatorConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ProcessSimulatorConfig {
        &self.config
    }

    fn setup_command(&self, request: &SetupRequest) -> Command {
        let mut cmd = Command::new(&self.config.setup_program);
        cmd.arg("-o")
            .arg(&request.target)
            .arg("--events")
            .arg(request.events.to_string());
        for (name, value) in request.state.iter() {
            cmd.arg(format!("--{name}")).arg(value.to_string());
        }
        cmd
    }

    fn run_command(&self, request: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.config.run_program);
        cmd.arg(&request.input)
            .arg("-o")
            .arg(&request.output)
            .arg("-c")
            .arg(request.events.to_string())
            .arg("--out-data-file")
            .arg(&request.data)
            .args(&request.options);
        cmd
    }
}

impl Simulator for ProcessSimulator {
    fn check_available(&self) -> Result<()> {
        for program in [&self.config.setup_program, &self.config.run_program] {
            if find_program(program).is_none() {
                return Err(Error::MissingTool(program.clone()));
            }
        }
        Ok(())
    }

    fn setup(&self, request: &SetupRequest, log: &mut RunLog) -> SetupOutcome {
        let mut cmd = self.setup_command(request);
        let line = command_line(&cmd);
        if let Err(e) = log.banner(format!("setup: {line}")) {
            return SetupOutcome::Failed(e.to_string());
        }
        let status = match log.stdio() {
            Ok((out, err)) => cmd.stdin(Stdio::null()).stdout(out).stderr(err).status(),
            Err(e) => return SetupOutcome::Failed(e.to_string()),
        };
        match status {
            Ok(status) if status.success() => {
                if request.target.is_file() {
                    SetupOutcome::Created(request.target.clone())
                } else {
                    SetupOutcome::Failed(format!("\"{line}\" succeeded but wrote no configuration"))
                }
            }
            Ok(status) if status.code() == Some(self.config.skip_exit_code) => {
                debug!("setup declined state {}", request.state);
                SetupOutcome::Skipped
            }
            Ok(status) => SetupOutcome::Failed(format!("\"{line}\" exited with {status}")),
            Err(e) => SetupOutcome::Failed(format!("could not start \"{line}\": {e}")),
        }
    }

    fn run(&self, request: &RunRequest, log: &mut RunLog) -> Result<()> {
        let mut cmd = self.run_command(request);
        let command = command_line(&cmd);
        log.banner(format!("run: {command}"))?;
        let (out, err) = log.stdio()?;
        let status = cmd
            .stdin(Stdio::null())
            .stdout(out)
            .stderr(err)
            .status()
            .map_err(|e| Error::ExternalProcess {
                command: command.clone(),
                log: log.path().to_path_buf(),
                status: format!("could not start: {e}"),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::ExternalProcess {
                command,
                log: log.path().to_path_buf(),
                status: status.to_string(),
            })
        }
    }
}

fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| {
            let part = part.to_string_lossy();
            if part.contains(char::is_whitespace) {
                format!("'{part}'")
            } else {
                part.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Locate an executable; names containing a separator are checked as paths
#[must_use]
pub fn find_program(program: &str) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
