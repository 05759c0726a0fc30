//! Data types and error definitions for the stop utility.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A managed background service this utility is allowed to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessName {
    Automator,
    Coordinator,
}

impl ProcessName {
    /// The allow-list, in declaration order.
    pub const ALL: [ProcessName; 2] = [ProcessName::Automator, ProcessName::Coordinator];

    /// Name the supervisor knows the process by.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessName::Automator => "automator",
            ProcessName::Coordinator => "coordinator",
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessName {
    type Err = StopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProcessName::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| StopError::UnknownProcess(s.to_string()))
    }
}

/// Represents a process entry.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: i32,
    pub name: String,
    pub state: String,
    pub ppid: i32,
}

/// How a single invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The argument was not on the allow-list; nothing was notified or stopped.
    Usage { exit_code: i32 },
    /// A precondition failed before any side effect.
    EnvironmentFailed { exit_code: i32 },
    /// The supervisor was invoked. `exit_code` is its status.
    Delegated { exit_code: i32, notified: bool },
}

impl StopOutcome {
    /// Status the process should exit with.
    pub fn exit_code(&self) -> i32 {
        match *self {
            StopOutcome::Usage { exit_code }
            | StopOutcome::EnvironmentFailed { exit_code }
            | StopOutcome::Delegated { exit_code, .. } => exit_code,
        }
    }
}

/// Errors that can occur while stopping a process.
#[derive(Error, Debug)]
pub enum StopError {
    #[error("Unknown process name: {0:?}")]
    UnknownProcess(String),
    #[error("Environment check {check} failed with code {code}: {detail}")]
    Environment {
        check: String,
        code: i32,
        detail: String,
    },
    #[error("Notification failed: {0}")]
    Notification(String),
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Procfs error: {0}")]
    ProcfsError(String),
}

impl StopError {
    /// Exit status for an error that ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            StopError::Environment { code, .. } => *code,
            // Same status a shell reports for a missing command.
            StopError::Spawn { .. } => 127,
            _ => 1,
        }
    }
}

impl From<procfs::ProcError> for StopError {
    fn from(err: procfs::ProcError) -> Self {
        StopError::ProcfsError(err.to_string())
    }
}
