//! Supervisor delegation.

use crate::types::{ProcessName, StopError};
use nix::sys::signal::Signal;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};
use tracing::{error, info};

/// Verb the supervisor understands for stopping a watcher.
const STOP_VERB: &str = "stop";

/// External process supervisor.
pub trait Supervisor {
    /// Ask the supervisor to stop `process`. Returns its exit code.
    fn stop(&self, process: ProcessName) -> Result<i32, StopError>;
}

/// Supervisor driven through its command-line client, e.g. `circusctl stop automator`.
#[derive(Debug, Clone)]
pub struct CommandSupervisor {
    program: String,
    args: Vec<String>,
}

impl CommandSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Supervisor for CommandSupervisor {
    fn stop(&self, process: ProcessName) -> Result<i32, StopError> {
        info!(program = %self.program, %process, "asking supervisor to stop process");

        // stdio is inherited so the supervisor's reply reaches the operator.
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(STOP_VERB)
            .arg(process.as_str())
            .status()
            .map_err(|source| StopError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let code = exit_status_code(status);
        if code == 0 {
            info!(%process, "supervisor stopped process");
        } else {
            error!(%process, code, "supervisor returned non-zero status");
        }
        Ok(code)
    }
}

/// Exit code of a finished child, with signal deaths reported as `128 + signal`.
pub(crate) fn exit_status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    match status.signal() {
        Some(sig) => {
            let name = Signal::try_from(sig).map(|s| s.as_str()).unwrap_or("unknown");
            error!(signal = sig, signal_name = name, "child terminated by signal");
            128 + sig
        }
        None => 1,
    }
}
