//! Error types for alert processing, configuration and command execution.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The inbound payload could not be decoded into a notification.
#[derive(Debug, Error)]
#[error("cannot decode incoming notification: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// A matched action needs a label the alert does not carry.
///
/// Raised by the dispatch loop; aborts the rest of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "no label '{key}' present on the alert, action=[{action}] cannot be taken for alert=[{alert_name}]"
)]
pub struct MissingLabelError {
    /// Template key that has no matching label
    pub key: String,
    /// Name of the action that was matched
    pub action: String,
    /// Value of the alert's `alertname` label
    pub alert_name: String,
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the expected shape
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Config parsed but violates a rule
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while running a command.
#[derive(Debug, Error)]
pub enum ExecError {
    /// No shell program configured
    #[error("shell is not configured")]
    NoShell,

    /// Process could not be started
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Process did not finish in time and was killed
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// Waiting on the process or reading its output failed
    #[error("failed to collect command output: {0}")]
    Io(#[source] std::io::Error),
}
