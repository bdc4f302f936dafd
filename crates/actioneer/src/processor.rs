//! Alert-to-action pipeline.
//!
//! For every alert in a notification, in order:
//! - skip it if it has no `alertname` label
//! - skip it if no action is configured for it or it is not firing
//! - abort the whole batch if the action needs a label the alert lacks
//! - substitute label values into the command template and hand the
//!   command to the executor
//!
//! A missing label stops the batch: no further commands run for that
//! notification. Commands already handed off earlier in the batch are not
//! rolled back.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{Action, ActionCatalog};
use crate::command::CommandExecutor;
use crate::error::MissingLabelError;
use crate::notification::{Alert, Notification};

/// Check whether an alert has a configured action and is firing.
pub fn is_actionable(catalog: &dyn ActionCatalog, alert: &Alert) -> bool {
    if let Some(alert_name) = alert.name() {
        if catalog.action_by_alert_name(alert_name).is_some() && alert.is_firing() {
            return true;
        }
    }
    debug!(alert = ?alert.name(), "No action needed for alert");
    false
}

/// Ensure every template key of `action` is present in `labels`.
///
/// Stops at the first missing key.
pub fn validate_template_labels(
    action: &Action,
    labels: &HashMap<String, String>,
) -> Result<(), MissingLabelError> {
    match action
        .template_keys
        .iter()
        .find(|key| !labels.contains_key(key.as_str()))
    {
        Some(key) => Err(MissingLabelError {
            key: key.clone(),
            action: action.name.clone(),
            alert_name: action.alertname.clone(),
        }),
        None => Ok(()),
    }
}

/// Substitute label values into the action's command template.
///
/// Every occurrence of `prefix + key` is replaced by the label value in a
/// single pass over the template, so substituted values are never scanned
/// again. Where several keys match at one position the longest wins (ties by
/// name), so `$hostname` is not read as `$host` followed by `name`. An empty
/// prefix leaves the template unchanged.
pub fn compile_command(action: &Action, labels: &HashMap<String, String>, prefix: &str) -> String {
    let template = action.command_template.as_str();
    if prefix.is_empty() {
        return template.to_string();
    }

    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut command = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(prefix) {
        command.push_str(&rest[..pos]);
        let after = &rest[pos + prefix.len()..];

        match keys.iter().find(|key| after.starts_with(key.as_str())) {
            Some(key) => {
                command.push_str(&labels[*key]);
                rest = &after[key.len()..];
            }
            None => {
                command.push_str(prefix);
                rest = after;
            }
        }
    }

    command.push_str(rest);
    command
}

/// Why an alert was not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Alert carries no `alertname` label
    MissingAlertName,
    /// No action is configured for the alert name
    NoAction,
    /// An action exists but the alert is not firing
    NotFiring,
}

/// An alert that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAlert {
    /// Position in the notification
    pub index: usize,
    /// Alert name, if the alert had one
    pub alert_name: Option<String>,
    /// Why it was skipped
    pub reason: SkipReason,
}

/// A command handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedCommand {
    /// Position in the notification
    pub index: usize,
    /// Alert name that matched
    pub alert_name: String,
    /// Action that produced the command
    pub action: String,
    /// Fully substituted command
    pub command: String,
}

/// Outcome of a processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Commands handed to the executor, in batch order
    pub dispatched: Vec<DispatchedCommand>,
    /// Alerts that were not acted on, in batch order
    pub skipped: Vec<SkippedAlert>,
}

/// Runs notifications through the pipeline.
///
/// Holds read-only collaborators; one instance can serve concurrent batches.
pub struct Dispatcher {
    catalog: Arc<dyn ActionCatalog>,
    executor: Arc<dyn CommandExecutor>,
    dry_run: bool,
}

impl Dispatcher {
    /// Create a new dispatcher.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ActionCatalog>,
        executor: Arc<dyn CommandExecutor>,
        dry_run: bool,
    ) -> Self {
        Self {
            catalog,
            executor,
            dry_run,
        }
    }

    /// Whether commands are forwarded in dry-run mode.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Process every alert in the notification.
    ///
    /// # Errors
    /// Returns the first [`MissingLabelError`]; remaining alerts are not
    /// processed.
    pub fn take_actions(
        &self,
        notification: &Notification,
    ) -> Result<DispatchReport, MissingLabelError> {
        debug!(alerts = notification.alerts.len(), "Incoming notification");

        let mut report = DispatchReport::default();

        if notification.is_empty() {
            error!("No alerts in notification");
            return Ok(report);
        }

        for (index, alert) in notification.alerts.iter().enumerate() {
            let Some(alert_name) = alert.name() else {
                warn!(index, labels = ?alert.labels, "No alertname label, skipping alert");
                report.skipped.push(SkippedAlert {
                    index,
                    alert_name: None,
                    reason: SkipReason::MissingAlertName,
                });
                continue;
            };

            let action = match self.catalog.action_by_alert_name(alert_name) {
                Some(action) if alert.is_firing() => action,
                found => {
                    let reason = if found.is_some() {
                        SkipReason::NotFiring
                    } else {
                        SkipReason::NoAction
                    };
                    debug!(index, alert = %alert_name, status = %alert.status, ?reason, "Skipping alert");
                    report.skipped.push(SkippedAlert {
                        index,
                        alert_name: Some(alert_name.to_string()),
                        reason,
                    });
                    continue;
                }
            };
            debug!(alert = %alert_name, template = %action.command_template, "Processing alert");

            if let Err(e) = validate_template_labels(action, &alert.labels) {
                error!(alert = %alert_name, action = %action.name, key = %e.key, "{e}");
                return Err(e);
            }

            let command =
                compile_command(action, &alert.labels, self.catalog.substitution_prefix());
            info!(
                alert = %alert_name,
                action = %action.name,
                command = %command,
                dry_run = self.dry_run,
                "Dispatching command"
            );

            self.executor.execute(command.clone(), self.dry_run);
            report.dispatched.push(DispatchedCommand {
                index,
                alert_name: alert_name.to_string(),
                action: action.name.clone(),
                command,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::command::{ShellExecutor, ShellRunner};
    use crate::notification::FIRING;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Executor that records every invocation.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl RecordingExecutor {
        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for RecordingExecutor {
        fn execute(&self, command: String, dry_run: bool) {
            self.calls.lock().unwrap().push((command, dry_run));
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn alert(status: &str, pairs: &[(&str, &str)]) -> Alert {
        Alert {
            status: status.to_string(),
            labels: labels(pairs),
        }
    }

    fn disk_full_action() -> Action {
        Action {
            name: "cleanup-disk".to_string(),
            alertname: "DiskFull".to_string(),
            command_template: "/bin/cleanup $host".to_string(),
            template_keys: vec!["host".to_string()],
        }
    }

    fn catalog_with(actions: Vec<Action>) -> Arc<Catalog> {
        Arc::new(Catalog::new(actions, "$").unwrap())
    }

    fn dispatcher(actions: Vec<Action>, dry_run: bool) -> (Dispatcher, Arc<RecordingExecutor>) {
        let executor = Arc::new(RecordingExecutor::default());
        let dispatcher = Dispatcher::new(catalog_with(actions), executor.clone(), dry_run);
        (dispatcher, executor)
    }

    #[test]
    fn test_is_actionable() {
        let catalog = catalog_with(vec![disk_full_action()]);

        assert!(is_actionable(
            catalog.as_ref(),
            &alert(FIRING, &[("alertname", "DiskFull")])
        ));
        assert!(!is_actionable(
            catalog.as_ref(),
            &alert("resolved", &[("alertname", "DiskFull")])
        ));
        assert!(!is_actionable(
            catalog.as_ref(),
            &alert(FIRING, &[("alertname", "Other")])
        ));
        assert!(!is_actionable(catalog.as_ref(), &alert(FIRING, &[("host", "db1")])));
        assert!(!is_actionable(
            catalog.as_ref(),
            &alert("Firing", &[("alertname", "DiskFull")])
        ));
    }

    #[test]
    fn test_validate_template_labels() {
        let mut action = disk_full_action();
        assert!(validate_template_labels(&action, &labels(&[("host", "db1")])).is_ok());
        assert!(validate_template_labels(
            &action,
            &labels(&[("host", "db1"), ("extra", "x"), ("alertname", "DiskFull")])
        )
        .is_ok());

        let err = validate_template_labels(&action, &labels(&[("alertname", "DiskFull")]))
            .unwrap_err();
        assert_eq!(err.key, "host");
        assert_eq!(err.action, "cleanup-disk");
        assert_eq!(err.alert_name, "DiskFull");

        action.template_keys = vec![];
        assert!(validate_template_labels(&action, &HashMap::new()).is_ok());
    }

    #[test]
    fn test_validate_reports_first_missing_key() {
        let mut action = disk_full_action();
        action.template_keys = vec!["host".to_string(), "port".to_string(), "path".to_string()];

        let err = validate_template_labels(&action, &labels(&[("host", "db1")])).unwrap_err();
        assert_eq!(err.key, "port");
    }

    #[test]
    fn test_compile_command() {
        let action = disk_full_action();
        let command = compile_command(
            &action,
            &labels(&[("alertname", "DiskFull"), ("host", "db1")]),
            "$",
        );
        assert_eq!(command, "/bin/cleanup db1");
    }

    #[test]
    fn test_compile_replaces_every_occurrence() {
        let mut action = disk_full_action();
        action.command_template = "ssh $host 'df -h' && echo $host $missing".to_string();
        let command = compile_command(&action, &labels(&[("host", "db1")]), "$");
        assert_eq!(command, "ssh db1 'df -h' && echo db1 $missing");
        assert!(!command.contains("$host"));
    }

    #[test]
    fn test_compile_other_prefix() {
        let mut action = disk_full_action();
        action.command_template = "restart {{unit}} on $host".to_string();
        let command = compile_command(&action, &labels(&[("unit", "nginx")]), "{{");
        assert_eq!(command, "restart nginx}} on $host");
    }

    #[test]
    fn test_compile_overlapping_keys_longest_first() {
        let mut action = disk_full_action();
        action.command_template = "ping $hostname via $host".to_string();
        let pairs = labels(&[("host", "gw"), ("hostname", "db1.internal")]);

        let command = compile_command(&action, &pairs, "$");
        assert_eq!(command, "ping db1.internal via gw");
        assert_eq!(compile_command(&action, &pairs, "$"), command);
    }

    #[test]
    fn test_compile_does_not_rescan_substituted_values() {
        let mut action = disk_full_action();
        action.command_template = "echo $hostname $host".to_string();
        let pairs = labels(&[("hostname", "$host"), ("host", "gw")]);

        assert_eq!(compile_command(&action, &pairs, "$"), "echo $host gw");
    }

    #[test]
    fn test_compile_keeps_unknown_placeholders() {
        let mut action = disk_full_action();
        action.command_template = "echo $$ $port $host$".to_string();
        let command = compile_command(&action, &labels(&[("host", "db1")]), "$");
        assert_eq!(command, "echo $$ $port db1$");
    }

    #[test]
    fn test_is_actionable_agrees_with_dispatch() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let catalog = catalog_with(vec![disk_full_action()]);
        let alerts = vec![
            alert(FIRING, &[("alertname", "DiskFull"), ("host", "db1")]),
            alert("resolved", &[("alertname", "DiskFull"), ("host", "db2")]),
            alert(FIRING, &[("alertname", "Other"), ("host", "db3")]),
            alert(FIRING, &[("host", "db4")]),
        ];
        let expected: Vec<usize> = alerts
            .iter()
            .enumerate()
            .filter(|(_, a)| is_actionable(catalog.as_ref(), a))
            .map(|(i, _)| i)
            .collect();

        let report = dispatcher.take_actions(&Notification { alerts }).unwrap();

        let dispatched: Vec<usize> = report.dispatched.iter().map(|d| d.index).collect();
        assert_eq!(dispatched, expected);
        assert_eq!(executor.calls().len(), 1);
        assert_eq!(report.dispatched.len() + report.skipped.len(), 4);
    }

    #[tokio::test]
    async fn test_abort_keeps_earlier_commands_running() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("cleaned");
        let actions = vec![
            Action {
                name: "slow-cleanup".to_string(),
                alertname: "DiskFull".to_string(),
                command_template: format!("sleep 0.2; touch {}", marker.display()),
                template_keys: vec![],
            },
            Action {
                name: "echo-host".to_string(),
                alertname: "HostDown".to_string(),
                command_template: "echo $host".to_string(),
                template_keys: vec!["host".to_string()],
            },
        ];
        let executor = Arc::new(ShellExecutor::new(ShellRunner::new(
            vec!["/bin/sh".to_string(), "-c".to_string()],
            None,
        )));
        let dispatcher = Dispatcher::new(catalog_with(actions), executor.clone(), false);
        let notification = Notification {
            alerts: vec![
                alert(FIRING, &[("alertname", "DiskFull")]),
                alert(FIRING, &[("alertname", "HostDown")]),
            ],
        };

        assert!(dispatcher.take_actions(&notification).is_err());
        drop(dispatcher);
        drop(executor);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(marker.exists());
    }

    #[test]
    fn test_scenario_dispatches_compiled_command() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let notification = Notification {
            alerts: vec![alert(FIRING, &[("alertname", "DiskFull"), ("host", "db1")])],
        };

        let report = dispatcher.take_actions(&notification).unwrap();

        assert_eq!(executor.calls(), vec![("/bin/cleanup db1".to_string(), false)]);
        assert_eq!(report.dispatched.len(), 1);
        assert_eq!(report.dispatched[0].action, "cleanup-disk");
        assert_eq!(report.dispatched[0].alert_name, "DiskFull");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_scenario_missing_label_fails() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let notification = Notification {
            alerts: vec![alert(FIRING, &[("alertname", "DiskFull")])],
        };

        let err = dispatcher.take_actions(&notification).unwrap_err();

        assert_eq!(err.key, "host");
        assert_eq!(err.alert_name, "DiskFull");
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_scenario_resolved_is_skipped() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let notification = Notification {
            alerts: vec![alert("resolved", &[("alertname", "DiskFull"), ("host", "db1")])],
        };

        let report = dispatcher.take_actions(&notification).unwrap();

        assert!(executor.calls().is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::NotFiring);
    }

    #[test]
    fn test_scenario_empty_batch() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);

        let report = dispatcher.take_actions(&Notification::default()).unwrap();

        assert_eq!(report, DispatchReport::default());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn test_scenario_missing_alertname_is_skipped() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let notification = Notification {
            alerts: vec![alert(FIRING, &[("host", "db1")])],
        };

        let report = dispatcher.take_actions(&notification).unwrap();

        assert!(executor.calls().is_empty());
        assert_eq!(
            report.skipped,
            vec![SkippedAlert {
                index: 0,
                alert_name: None,
                reason: SkipReason::MissingAlertName,
            }]
        );
    }

    #[test]
    fn test_unknown_alert_is_skipped() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], false);
        let notification = Notification {
            alerts: vec![alert(FIRING, &[("alertname", "Watchdog")])],
        };

        let report = dispatcher.take_actions(&notification).unwrap();

        assert!(executor.calls().is_empty());
        assert_eq!(report.skipped[0].reason, SkipReason::NoAction);
        assert_eq!(report.skipped[0].alert_name.as_deref(), Some("Watchdog"));
    }

    #[test]
    fn test_missing_label_aborts_rest_of_batch() {
        let restart = Action {
            name: "restart".to_string(),
            alertname: "ServiceDown".to_string(),
            command_template: "systemctl restart $unit".to_string(),
            template_keys: vec!["unit".to_string()],
        };
        let (dispatcher, executor) = dispatcher(vec![disk_full_action(), restart], false);
        let notification = Notification {
            alerts: vec![
                alert(FIRING, &[("alertname", "ServiceDown"), ("unit", "nginx")]),
                alert(FIRING, &[("alertname", "DiskFull")]),
                alert(FIRING, &[("alertname", "ServiceDown"), ("unit", "redis")]),
            ],
        };

        let err = dispatcher.take_actions(&notification).unwrap_err();

        assert_eq!(err.key, "host");
        // the first command stays dispatched, the third never runs
        assert_eq!(
            executor.calls(),
            vec![("systemctl restart nginx".to_string(), false)]
        );
    }

    #[test]
    fn test_mixed_batch_in_order() {
        let (dispatcher, executor) = dispatcher(vec![disk_full_action()], true);
        let notification = Notification {
            alerts: vec![
                alert(FIRING, &[("alertname", "DiskFull"), ("host", "db1")]),
                alert(FIRING, &[("host", "db2")]),
                alert("resolved", &[("alertname", "DiskFull"), ("host", "db3")]),
                alert(FIRING, &[("alertname", "DiskFull"), ("host", "db4")]),
            ],
        };

        let report = dispatcher.take_actions(&notification).unwrap();

        assert_eq!(
            executor.calls(),
            vec![
                ("/bin/cleanup db1".to_string(), true),
                ("/bin/cleanup db4".to_string(), true),
            ]
        );
        let dispatched: Vec<usize> = report.dispatched.iter().map(|d| d.index).collect();
        let skipped: Vec<usize> = report.skipped.iter().map(|s| s.index).collect();
        assert_eq!(dispatched, vec![0, 3]);
        assert_eq!(skipped, vec![1, 2]);
    }
}
