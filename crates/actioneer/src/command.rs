//! Command execution.
//!
//! The dispatch loop hands commands off through [`CommandExecutor`] and never
//! looks at the result. [`ShellExecutor`] runs each command on its own tokio
//! task through a [`CommandRunner`] and logs the outcome.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::ExecError;

/// One-way sink for compiled commands.
pub trait CommandExecutor: Send + Sync {
    /// Hand off a command; returns without waiting for it to run.
    fn execute(&self, command: String, dry_run: bool);
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub status_code: Option<i32>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl CommandOutput {
    /// Check if the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Runs a single command to completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command and capture its output.
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError>;
}

/// Runs commands through a shell, e.g. `/bin/sh -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: Vec<String>,
    timeout: Option<Duration>,
}

impl ShellRunner {
    /// Create a runner from a shell invocation and optional timeout.
    #[must_use]
    pub fn new(shell: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { shell, timeout }
    }

    /// Create a runner from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.shell.clone(), config.command_timeout())
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        let (program, args) = self.shell.split_first().ok_or(ExecError::NoShell)?;

        let child = Command::new(program)
            .args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecError::Spawn)?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| ExecError::Timeout(timeout))?,
            None => child.wait_with_output().await,
        }
        .map_err(ExecError::Io)?;

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Fire-and-forget executor backed by a [`CommandRunner`].
pub struct ShellExecutor<R> {
    runner: Arc<R>,
    tasks: Mutex<JoinSet<()>>,
}

impl<R: CommandRunner + 'static> ShellExecutor<R> {
    /// Create an executor around a runner.
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Wait for every command handed off so far to finish.
    pub async fn wait(&self) {
        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        while tasks.join_next().await.is_some() {}
    }

    /// Number of commands still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock_tasks().len()
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<R> Drop for ShellExecutor<R> {
    fn drop(&mut self) {
        // Commands already handed off keep running after the executor is gone.
        self.tasks
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .detach_all();
    }
}

impl<R: CommandRunner + 'static> CommandExecutor for ShellExecutor<R> {
    fn execute(&self, command: String, dry_run: bool) {
        if dry_run {
            info!(command = %command, "Dry run, not executing command");
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(command = %command, "No async runtime available, command dropped");
            return;
        };

        let runner = Arc::clone(&self.runner);
        let mut tasks = self.lock_tasks();

        // Reap finished commands so the set only holds running ones.
        while tasks.try_join_next().is_some() {}

        tasks.spawn_on(
            async move {
                debug!(command = %command, "Running command");
                match runner.run(&command).await {
                    Ok(output) if output.success() => {
                        info!(command = %command, "Command succeeded");
                        debug!(stdout = %output.stdout.trim(), stderr = %output.stderr.trim(), "Command output");
                    }
                    Ok(output) => {
                        error!(
                            command = %command,
                            exit_code = ?output.status_code,
                            stderr = %output.stderr.trim(),
                            "Command failed"
                        );
                        debug!(stdout = %output.stdout.trim(), "Command output");
                    }
                    Err(e) => {
                        error!(command = %command, error = %e, "Failed to run command");
                    }
                }
            },
            &handle,
        );
    }
}
