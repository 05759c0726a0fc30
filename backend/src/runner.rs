//! The stop sequence: validate, check the environment, notify, delegate.

use crate::config::{resolve_secret, Config, NotifierConfig};
use crate::environment::{CommandCheck, DaemonCheck, EnvironmentCheck, EnvironmentChecks, ExecutableCheck};
use crate::identity::operator_identity;
use crate::notify::{
    compose_message, CommandNotifier, GrafanaAnnotator, Notifier, Notifiers, UnavailableNotifier, WebhookNotifier,
};
use crate::process_stop::{CommandSupervisor, Supervisor};
use crate::types::{ProcessName, StopError, StopOutcome};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Program name shown in the usage line.
pub const PROGRAM_NAME: &str = "procstop";

/// One-line usage text listing the allow-list.
pub fn usage() -> String {
    let names: Vec<&str> = ProcessName::ALL.iter().map(|p| p.as_str()).collect();
    format!("Usage: {} <{}>", PROGRAM_NAME, names.join("|"))
}

fn write_usage<W: Write>(out: &mut W) {
    if let Err(e) = writeln!(out, "{}", usage()) {
        warn!("failed to print usage: {}", e);
    }
}

fn build_notifier(config: &NotifierConfig, timeout: Duration) -> Result<Box<dyn Notifier>, StopError> {
    let built: Box<dyn Notifier> = match config {
        NotifierConfig::Command { program, args } => Box::new(CommandNotifier::new(program.clone(), args.clone())),
        NotifierConfig::Webhook { url, token } => {
            let token = token.as_deref().map(resolve_secret).transpose()?;
            Box::new(WebhookNotifier::new(url.clone(), token, timeout)?)
        }
        NotifierConfig::Grafana { url, token, tag } => Box::new(GrafanaAnnotator::new(
            url.clone(),
            resolve_secret(token)?,
            tag.clone(),
            timeout,
        )?),
    };
    Ok(built)
}

fn notifier_label(config: &NotifierConfig) -> &str {
    match config {
        NotifierConfig::Command { program, .. } => program.as_str(),
        NotifierConfig::Webhook { url, .. } | NotifierConfig::Grafana { url, .. } => url.as_str(),
    }
}

pub struct StopRunner {
    checks: Box<dyn EnvironmentCheck>,
    notifier: Box<dyn Notifier>,
    supervisor: Box<dyn Supervisor>,
    channel: String,
    operator: Option<String>,
    usage_exit_code: i32,
}

impl StopRunner {
    pub fn new(
        checks: Box<dyn EnvironmentCheck>,
        notifier: Box<dyn Notifier>,
        supervisor: Box<dyn Supervisor>,
    ) -> Self {
        let defaults = Config::default();
        Self {
            checks,
            notifier,
            supervisor,
            channel: defaults.channel,
            operator: defaults.operator,
            usage_exit_code: defaults.usage_exit_code,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn usage_exit_code(mut self, code: i32) -> Self {
        self.usage_exit_code = code;
        self
    }

    /// Build the command-backed collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, StopError> {
        let mut checks = EnvironmentChecks::new();
        for program in &config.environment.require_executables {
            checks.push(Box::new(ExecutableCheck::new(program.clone())));
        }
        if let Some(command) = &config.environment.command {
            let (program, args) = command
                .split_first()
                .ok_or_else(|| StopError::Config("environment.command is empty".to_string()))?;
            checks.push(Box::new(CommandCheck::new(program.clone(), args.to_vec())));
        }
        if let Some(daemon) = &config.environment.daemon {
            checks.push(Box::new(DaemonCheck::new(daemon.clone())));
        }

        // A destination that cannot be set up must not block the stop.
        let mut notifiers = Notifiers::new();
        for notifier in &config.notifiers {
            match build_notifier(notifier, config.http_timeout()) {
                Ok(built) => notifiers.push(built),
                Err(e) => {
                    warn!(destination = notifier_label(notifier), "notifier unavailable: {}", e);
                    notifiers.push(Box::new(UnavailableNotifier::new(notifier_label(notifier), e.to_string())));
                }
            }
        }
        debug!(
            checks = checks.len(),
            notifiers = notifiers.len(),
            supervisor = %config.supervisor.program,
            "collaborators configured"
        );

        let supervisor = CommandSupervisor::new(config.supervisor.program.clone(), config.supervisor.args.clone());

        let mut runner = StopRunner::new(Box::new(checks), Box::new(notifiers), Box::new(supervisor))
            .channel(config.channel.clone())
            .usage_exit_code(config.usage_exit_code);
        runner.operator = config.operator.clone();
        Ok(runner)
    }

    /// Entry point for the front end: `config` is whatever loading produced.
    ///
    /// The argument is validated first, so an unrecognised name prints usage
    /// even when the configuration is broken; `usage_exit_code` then falls back
    /// to its default. Configuration errors only surface for allow-listed names.
    pub fn invoke<W: Write>(
        config: Result<Config, StopError>,
        arg: Option<&str>,
        out: &mut W,
    ) -> Result<StopOutcome, StopError> {
        if let Err(e) = arg.unwrap_or("").parse::<ProcessName>() {
            debug!("{}", e);
            let exit_code = match &config {
                Ok(config) => config.usage_exit_code,
                Err(config_err) => {
                    warn!("ignoring configuration for usage: {}", config_err);
                    Config::default().usage_exit_code
                }
            };
            write_usage(out);
            return Ok(StopOutcome::Usage { exit_code });
        }
        let runner = StopRunner::from_config(&config?)?;
        Ok(runner.run(arg, out))
    }

    /// Run one invocation for the positional argument `arg`.
    ///
    /// Usage text goes to `out`. Nothing else is written there.
    pub fn run<W: Write>(&self, arg: Option<&str>, out: &mut W) -> StopOutcome {
        let process = match arg.unwrap_or("").parse::<ProcessName>() {
            Ok(process) => process,
            Err(e) => {
                debug!("{}", e);
                write_usage(out);
                return StopOutcome::Usage {
                    exit_code: self.usage_exit_code,
                };
            }
        };

        if let Err(e) = self.checks.check() {
            error!(%process, "aborting: {}", e);
            return StopOutcome::EnvironmentFailed {
                exit_code: e.exit_code(),
            };
        }

        let operator = self.operator.clone().unwrap_or_else(operator_identity);
        let message = compose_message(&operator, process);
        let notified = match self.notifier.notify(&self.channel, &message) {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %self.channel, "continuing without notification: {}", e);
                false
            }
        };

        let exit_code = match self.supervisor.stop(process) {
            Ok(code) => code,
            Err(e) => {
                error!(%process, "supervisor could not be run: {}", e);
                e.exit_code()
            }
        };
        info!(%process, %operator, exit_code, notified, "stop finished");

        StopOutcome::Delegated { exit_code, notified }
    }
}
