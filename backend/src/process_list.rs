//! Process listing through `/proc`.

use crate::types::{ProcessInfo, StopError};

// Kernel truncates `comm` to TASK_COMM_LEN - 1 bytes.
const COMM_LEN: usize = 15;

/// List all processes with their info.
/// Returns a vector of `ProcessInfo`.
pub fn list_processes() -> Result<Vec<ProcessInfo>, StopError> {
    let mut processes = Vec::new();

    let all_procs = procfs::process::all_processes()?;

    // Processes can exit between readdir and stat; skip those.
    for proc in all_procs.flatten() {
        if let Ok(stat) = proc.stat() {
            processes.push(ProcessInfo {
                pid: stat.pid,
                name: stat.comm.clone(),
                state: stat.state.to_string(),
                ppid: stat.ppid,
            });
        }
    }

    Ok(processes)
}

/// Running processes whose command name is `name`.
pub fn find_processes(name: &str) -> Result<Vec<ProcessInfo>, StopError> {
    Ok(list_processes()?
        .into_iter()
        .filter(|p| comm_matches(&p.name, name))
        .collect())
}

fn comm_matches(comm: &str, name: &str) -> bool {
    if name.len() > COMM_LEN {
        name.get(..COMM_LEN).map_or(false, |prefix| prefix == comm)
    } else {
        comm == name
    }
}
