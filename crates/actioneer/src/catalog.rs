//! Configured actions and alert name lookup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ConfigError;

/// A remediation recipe bound to an alert name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    /// Action name, used in logs and errors
    pub name: String,
    /// Value of the `alertname` label this action reacts to
    pub alertname: String,
    /// Shell command with placeholder tokens
    #[serde(rename = "command")]
    pub command_template: String,
    /// Labels the template needs; each must be present on the alert
    #[serde(default)]
    pub template_keys: Vec<String>,
}

impl Action {
    /// Template keys that never appear as `prefix + key` in the command.
    #[must_use]
    pub fn unused_template_keys(&self, prefix: &str) -> Vec<&str> {
        self.template_keys
            .iter()
            .filter(|key| !self.command_template.contains(&format!("{prefix}{key}")))
            .map(String::as_str)
            .collect()
    }
}

/// Read-only lookup of actions by alert name.
pub trait ActionCatalog: Send + Sync {
    /// Find the action configured for an alert name.
    fn action_by_alert_name(&self, alert_name: &str) -> Option<&Action>;

    /// Literal prefix that turns a label key into a placeholder token.
    fn substitution_prefix(&self) -> &str;
}

/// In-memory catalog built from configuration.
#[derive(Debug, Clone)]
pub struct Catalog {
    actions: HashMap<String, Action>,
    substitution_prefix: String,
}

impl Catalog {
    /// Build a catalog from a set of actions.
    ///
    /// Rejects an empty prefix and actions sharing an alert name.
    pub fn new(
        actions: impl IntoIterator<Item = Action>,
        substitution_prefix: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let substitution_prefix = substitution_prefix.into();
        if substitution_prefix.is_empty() {
            return Err(ConfigError::Invalid("substitution_prefix must not be empty".to_string()));
        }

        let mut by_alert: HashMap<String, Action> = HashMap::new();
        for action in actions {
            for key in action.unused_template_keys(&substitution_prefix) {
                warn!(
                    action = %action.name,
                    key = %key,
                    "Template key is required but never used in the command"
                );
            }

            if let Some(existing) = by_alert.get(&action.alertname) {
                return Err(ConfigError::Invalid(format!(
                    "actions '{}' and '{}' both handle alert '{}'",
                    existing.name, action.name, action.alertname
                )));
            }

            debug!(action = %action.name, alert = %action.alertname, "Registered action");
            by_alert.insert(action.alertname.clone(), action);
        }

        Ok(Self {
            actions: by_alert,
            substitution_prefix,
        })
    }

    /// Build a catalog from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Self::new(config.actions.clone(), config.substitution_prefix.clone())
    }

    /// Number of registered actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Check if no actions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// All actions, sorted by name.
    #[must_use]
    pub fn actions(&self) -> Vec<&Action> {
        let mut actions: Vec<&Action> = self.actions.values().collect();
        actions.sort_by(|a, b| a.name.cmp(&b.name));
        actions
    }
}

impl ActionCatalog for Catalog {
    fn action_by_alert_name(&self, alert_name: &str) -> Option<&Action> {
        self.actions.get(alert_name)
    }

    fn substitution_prefix(&self) -> &str {
        &self.substitution_prefix
    }
}
