//! Last-resort remediation hooks.
//!
//! Runs once when recovery is exhausted. Best-effort only: the result is
//! logged and never changes the terminal outcome.

use crate::capture::RemediationConfig;
use chrono::Utc;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running remediation command is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors reported by a remediation hook.
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("no remediation available")]
    Unavailable,
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    ExitStatus { program: String, status: String },
    #[error("{program} still running after {timeout:?}, killed")]
    Timeout { program: String, timeout: Duration },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write flag file {path}: {source}")]
    FlagFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A no-argument, blocking, best-effort recovery action.
pub trait Remediation: Send + Sync + 'static {
    fn remediate(&self) -> Result<(), RemediationError>;
}

/// Reports that nothing can be done.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRemediation;

impl Remediation for NoRemediation {
    fn remediate(&self) -> Result<(), RemediationError> {
        Err(RemediationError::Unavailable)
    }
}

/// Runs an external program, e.g. a service manager restart.
///
/// The program gets `timeout` to finish and is killed after that, so a
/// hung command cannot keep the engine from halting.
#[derive(Debug, Clone)]
pub struct CommandRemediation {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRemediation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Remediation for CommandRemediation {
    fn remediate(&self) -> Result<(), RemediationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| RemediationError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let waited = child.try_wait().map_err(|source| RemediationError::Wait {
                program: self.program.clone(),
                source,
            })?;
            match waited {
                Some(status) if status.success() => return Ok(()),
                Some(status) => {
                    return Err(RemediationError::ExitStatus {
                        program: self.program.clone(),
                        status: status.to_string(),
                    })
                }
                None if Instant::now() >= deadline => {
                    if let Err(e) = child.kill() {
                        tracing::warn!(
                            program = %self.program,
                            error = %e,
                            "Failed to kill remediation command"
                        );
                    }
                    // Reap the killed child.
                    let _ = child.wait();
                    return Err(RemediationError::Timeout {
                        program: self.program.clone(),
                        timeout: self.timeout,
                    });
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

/// Writes a restart-needed flag file for an external supervisor.
#[derive(Debug, Clone)]
pub struct FlagFileRemediation {
    path: PathBuf,
}

impl FlagFileRemediation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Remediation for FlagFileRemediation {
    fn remediate(&self) -> Result<(), RemediationError> {
        let contents = format!(
            "{} camera recovery exhausted; restart required\n",
            Utc::now().to_rfc3339()
        );
        std::fs::write(&self.path, contents).map_err(|source| RemediationError::FlagFile {
            path: self.path.clone(),
            source,
        })
    }
}

/// Builds the hook selected by configuration.
pub fn from_config(config: &RemediationConfig) -> Box<dyn Remediation> {
    match config {
        RemediationConfig::None => Box::new(NoRemediation),
        RemediationConfig::Command {
            program,
            args,
            timeout_secs,
        } => Box::new(
            CommandRemediation::new(program.clone(), args.clone())
                .with_timeout(Duration::from_secs(*timeout_secs)),
        ),
        RemediationConfig::FlagFile { path } => Box::new(FlagFileRemediation::new(path.clone())),
    }
}
