//! UI-agnostic core of the operator stop utility.
//!
//! Validates a process name against a fixed allow-list, checks the environment,
//! announces the stop on an operator channel and hands the stop itself to an
//! external process supervisor. Uses `nix` and `procfs` for system interaction.

mod config;
mod environment;
mod identity;
mod notify;
mod process_list;
mod process_stop;
mod runner;
mod types;

pub use config::{resolve_secret, Config, EnvironmentConfig, NotifierConfig, SupervisorConfig, CONFIG_ENV};
pub use environment::{CommandCheck, DaemonCheck, EnvironmentCheck, EnvironmentChecks, ExecutableCheck};
pub use identity::operator_identity;
pub use notify::{
    compose_message, CommandNotifier, GrafanaAnnotator, Notifier, Notifiers, UnavailableNotifier, WebhookNotifier,
};
pub use process_list::{find_processes, list_processes};
pub use process_stop::{CommandSupervisor, Supervisor};
pub use runner::{usage, StopRunner, PROGRAM_NAME};
pub use types::{ProcessInfo, ProcessName, StopError, StopOutcome};
