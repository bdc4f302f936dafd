//! YAML configuration: listener, execution settings and the action list.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::catalog::Action;
use crate::error::ConfigError;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "actioneer.yaml";

/// Default listen address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Default placeholder prefix.
pub const DEFAULT_SUBSTITUTION_PREFIX: &str = "$";

/// Default command timeout in seconds.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

/// Default request body cap (1 MiB).
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the webhook server binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Prefix prepended to a label key to form a placeholder
    #[serde(default = "default_substitution_prefix")]
    pub substitution_prefix: String,

    /// Log commands instead of running them
    #[serde(default)]
    pub dry_run: bool,

    /// Shell program and leading arguments; the command is appended
    #[serde(default = "default_shell")]
    pub shell: Vec<String>,

    /// Kill commands running longer than this (0 disables)
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Maximum accepted webhook body size
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Configured actions
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_substitution_prefix() -> String {
    DEFAULT_SUBSTITUTION_PREFIX.to_string()
}

fn default_shell() -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string()]
}

const fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            substitution_prefix: default_substitution_prefix(),
            dry_run: false,
            shell: default_shell(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            actions: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the rules serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.substitution_prefix.is_empty() {
            return Err(ConfigError::Invalid("substitution_prefix must not be empty".to_string()));
        }

        if self.shell.first().is_none_or(String::is_empty) {
            return Err(ConfigError::Invalid("shell must name a program".to_string()));
        }

        let mut names = HashSet::new();
        let mut alertnames = HashSet::new();

        for (index, action) in self.actions.iter().enumerate() {
            if action.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("action #{index} has an empty name")));
            }
            if action.alertname.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "action '{}' has an empty alertname",
                    action.name
                )));
            }
            if action.command_template.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "action '{}' has an empty command",
                    action.name
                )));
            }
            if !names.insert(action.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate action name '{}'",
                    action.name
                )));
            }
            if !alertnames.insert(action.alertname.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "more than one action handles alert '{}'",
                    action.alertname
                )));
            }
        }

        Ok(())
    }

    /// Command timeout, or `None` when disabled.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_timeout_secs > 0).then(|| Duration::from_secs(self.command_timeout_secs))
    }
}
