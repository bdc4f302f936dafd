//! Alertmanager webhook receiver that turns firing alerts into shell commands.
//!
//! Each configured action binds an alert name to a command template. When a
//! notification arrives, every firing alert with a matching action has its
//! labels substituted into the template and the result is run.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use actioneer::{decode, Catalog, Config, Dispatcher, ShellExecutor, ShellRunner};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::load("actioneer.yaml")?;
//! let catalog = Arc::new(Catalog::from_config(&config)?);
//! let executor = Arc::new(ShellExecutor::new(ShellRunner::from_config(&config)));
//! let dispatcher = Dispatcher::new(catalog, executor, config.dry_run);
//!
//! let notification = decode(br#"{"alerts": []}"#)?;
//! let report = dispatcher.take_actions(&notification)?;
//! println!("{} commands dispatched", report.dispatched.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Placeholders
//!
//! A placeholder is the substitution prefix followed by a label key, e.g.
//! `$host`. Replacement is literal text replacement; keys are applied
//! longest first so that `$hostname` is not clobbered by `$host`.

pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod notification;
pub mod processor;
pub mod server;

pub use catalog::{Action, ActionCatalog, Catalog};
pub use command::{CommandExecutor, CommandOutput, CommandRunner, ShellExecutor, ShellRunner};
pub use config::Config;
pub use error::{ConfigError, DecodeError, ExecError, MissingLabelError};
pub use notification::{decode, Alert, Notification};
pub use processor::{
    compile_command, is_actionable, validate_template_labels, DispatchReport, DispatchedCommand,
    Dispatcher, SkipReason, SkippedAlert,
};
pub use server::{build_router, run_server, ServerState};
