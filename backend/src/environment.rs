//! Preconditions checked before any side effect.

use crate::process_list::find_processes;
use crate::process_stop::exit_status_code;
use crate::types::StopError;
use std::process::Command;
use tracing::debug;

/// A precondition that must hold before notifying or stopping anything.
pub trait EnvironmentCheck {
    fn name(&self) -> &str;
    fn check(&self) -> Result<(), StopError>;
}

/// Runs an external validation command; a non-zero status fails the check.
#[derive(Debug, Clone)]
pub struct CommandCheck {
    program: String,
    args: Vec<String>,
}

impl CommandCheck {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl EnvironmentCheck for CommandCheck {
    fn name(&self) -> &str {
        &self.program
    }

    fn check(&self) -> Result<(), StopError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|source| StopError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        Err(StopError::Environment {
            check: self.program.clone(),
            code: exit_status_code(output.status),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Requires a program to resolve on `PATH`.
#[derive(Debug, Clone)]
pub struct ExecutableCheck {
    program: String,
}

impl ExecutableCheck {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EnvironmentCheck for ExecutableCheck {
    fn name(&self) -> &str {
        &self.program
    }

    fn check(&self) -> Result<(), StopError> {
        match which::which(&self.program) {
            Ok(path) => {
                debug!(program = %self.program, path = %path.display(), "found executable");
                Ok(())
            }
            Err(e) => Err(StopError::Environment {
                check: self.program.clone(),
                code: 127,
                detail: format!("not found on PATH: {}", e),
            }),
        }
    }
}

/// Requires a running process with the given command name, typically the supervisor daemon.
#[derive(Debug, Clone)]
pub struct DaemonCheck {
    process: String,
}

impl DaemonCheck {
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
        }
    }
}

impl EnvironmentCheck for DaemonCheck {
    fn name(&self) -> &str {
        &self.process
    }

    fn check(&self) -> Result<(), StopError> {
        let running = find_processes(&self.process)?;
        if running.is_empty() {
            return Err(StopError::Environment {
                check: self.process.clone(),
                code: 1,
                detail: "no running process with this name".to_string(),
            });
        }
        let pids: Vec<i32> = running.iter().map(|p| p.pid).collect();
        debug!(process = %self.process, ?pids, "daemon is running");
        Ok(())
    }
}

/// Ordered set of checks; the first failure wins.
#[derive(Default)]
pub struct EnvironmentChecks {
    checks: Vec<Box<dyn EnvironmentCheck>>,
}

impl EnvironmentChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, check: Box<dyn EnvironmentCheck>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl EnvironmentCheck for EnvironmentChecks {
    fn name(&self) -> &str {
        "environment"
    }

    fn check(&self) -> Result<(), StopError> {
        for check in &self.checks {
            debug!(check = check.name(), "running environment check");
            check.check()?;
        }
        Ok(())
    }
}
