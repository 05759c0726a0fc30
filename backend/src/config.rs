//! Configuration loading.
//!
//! Configuration is a TOML file. Every key is optional; missing keys take the
//! defaults below. Notifier tokens may be written as `env:NAME`; they are read
//! from the environment when the notifier is built, not when the file is parsed.

use crate::types::StopError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "PROCSTOP_CONFIG";

const SECRET_ENV_PREFIX: &str = "env:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel notifications are posted to
    pub channel: String,

    /// Operator name override; resolved from the OS when absent
    pub operator: Option<String>,

    /// Exit status when the process name is not recognised
    pub usage_exit_code: i32,

    /// Timeout for HTTP notifiers (in seconds)
    pub http_timeout_secs: u64,

    pub supervisor: SupervisorConfig,

    pub environment: EnvironmentConfig,

    pub notifiers: Vec<NotifierConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Supervisor client program
    pub program: String,

    /// Arguments placed before `stop <name>`
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Programs that must resolve on PATH
    pub require_executables: Vec<String>,

    /// Validation command, program first
    pub command: Option<Vec<String>>,

    /// Process name that must be running, e.g. the supervisor daemon
    pub daemon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifierConfig {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Webhook {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
    Grafana {
        url: String,
        token: String,
        #[serde(default = "default_grafana_tag")]
        tag: String,
    },
}

fn default_grafana_tag() -> String {
    "procstop".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: "alerts".to_string(),
            operator: None,
            usage_exit_code: 0,
            http_timeout_secs: 10,
            supervisor: SupervisorConfig::default(),
            environment: EnvironmentConfig::default(),
            notifiers: vec![NotifierConfig::Command {
                program: "slack".to_string(),
                args: Vec::new(),
            }],
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "circusctl".to_string(),
            args: Vec::new(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            require_executables: vec!["circusctl".to_string()],
            command: None,
            daemon: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, StopError> {
        let content = fs::read_to_string(path)
            .map_err(|e| StopError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::parse(&content).map_err(|e| match e {
            StopError::Config(msg) => StopError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from `$PROCSTOP_CONFIG` if set, otherwise use defaults.
    pub fn from_env() -> Result<Self, StopError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(&PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Parse TOML text.
    pub fn parse(content: &str) -> Result<Self, StopError> {
        toml::from_str(content).map_err(|e| StopError::Config(e.to_string()))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Expand an `env:NAME` secret from the process environment; other values pass through.
pub fn resolve_secret(value: &str) -> Result<String, StopError> {
    resolve_secret_with(value, |key| env::var(key).ok())
}

fn resolve_secret_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String, StopError> {
    match value.strip_prefix(SECRET_ENV_PREFIX) {
        Some(key) => lookup(key)
            .ok_or_else(|| StopError::Config(format!("environment variable {} is not set", key))),
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.channel, "alerts");
        assert_eq!(config.usage_exit_code, 0);
        assert_eq!(config.supervisor.program, "circusctl");
        assert_eq!(config.environment.require_executables, vec!["circusctl"]);
        assert_eq!(config.notifiers.len(), 1);
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            channel = "ops"
            operator = "obs"
            usage_exit_code = 2
            http_timeout_secs = 3

            [supervisor]
            program = "/opt/circus/bin/circusctl"
            args = ["--endpoint", "tcp://127.0.0.1:5555"]

            [environment]
            require_executables = []
            command = ["/usr/local/bin/check_env", "--quiet"]
            daemon = "circusd"

            [[notifiers]]
            kind = "webhook"
            url = "https://hooks.example.org/T000"

            [[notifiers]]
            kind = "grafana"
            url = "http://grafana:3000/api/annotations"
            token = "abc"
        "#;
        let config = Config::parse(text).unwrap();
        assert_eq!(config.channel, "ops");
        assert_eq!(config.operator.as_deref(), Some("obs"));
        assert_eq!(config.usage_exit_code, 2);
        assert_eq!(config.http_timeout(), Duration::from_secs(3));
        assert_eq!(config.supervisor.args.len(), 2);
        assert!(config.environment.require_executables.is_empty());
        assert_eq!(config.environment.daemon.as_deref(), Some("circusd"));
        assert_eq!(
            config.notifiers[0],
            NotifierConfig::Webhook {
                url: "https://hooks.example.org/T000".into(),
                token: None
            }
        );
        assert_eq!(
            config.notifiers[1],
            NotifierConfig::Grafana {
                url: "http://grafana:3000/api/annotations".into(),
                token: "abc".into(),
                tag: "procstop".into()
            }
        );
    }

    #[test]
    fn test_secret_resolution() {
        let lookup = |key: &str| (key == "HOOK_TOKEN").then(|| "s3cret".to_string());
        assert_eq!(resolve_secret_with("env:HOOK_TOKEN", lookup).unwrap(), "s3cret");
        assert_eq!(resolve_secret_with("plain", lookup).unwrap(), "plain");
        assert!(matches!(
            resolve_secret_with("env:GRAFANA_AUTH", |_| None),
            Err(StopError::Config(_))
        ));
    }

    #[test]
    fn test_unset_secret_does_not_fail_parse() {
        let text = r#"
            [[notifiers]]
            kind = "grafana"
            url = "http://grafana:3000/api/annotations"
            token = "env:PROCSTOP_TEST_UNSET_GRAFANA_AUTH"
        "#;
        let config = Config::parse(text).unwrap();
        assert!(matches!(
            &config.notifiers[0],
            NotifierConfig::Grafana { token, .. } if token == "env:PROCSTOP_TEST_UNSET_GRAFANA_AUTH"
        ));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(Config::parse("channel = ["), Err(StopError::Config(_))));
        assert!(matches!(
            Config::parse("[[notifiers]]\nkind = \"pager\""),
            Err(StopError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "channel = \"night-shift\"").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.channel, "night-shift");

        let missing = Config::load(Path::new("/nonexistent/procstop.toml"));
        assert!(matches!(missing, Err(StopError::Config(_))));
    }
}
