//! Incoming notification types and decoding.
//!
//! The payload follows the Alertmanager webhook format:
//! <https://prometheus.io/docs/alerting/latest/configuration/#webhook_config>
//!
//! Only `alerts[].status` and `alerts[].labels` are read; every other field
//! Alertmanager sends (group labels, annotations, timestamps) is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error};

use crate::error::DecodeError;

/// Reserved label identifying which alert fired.
pub const ALERT_NAME_LABEL: &str = "alertname";

/// Status value that makes an alert actionable.
pub const FIRING: &str = "firing";

/// A single alert in a notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Alert {
    /// "firing" or "resolved"
    #[serde(default)]
    pub status: String,
    /// Alert labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Alert {
    /// Value of the `alertname` label, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.labels.get(ALERT_NAME_LABEL).map(String::as_str)
    }

    /// Check if this is a firing alert.
    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.status == FIRING
    }
}

/// A batch of alerts delivered together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Notification {
    /// Alerts in delivery order
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

impl Notification {
    /// Check if the notification carries no alerts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

/// Decode a raw webhook body into a [`Notification`].
pub fn decode(bytes: &[u8]) -> Result<Notification, DecodeError> {
    debug!(body = %String::from_utf8_lossy(bytes), "Incoming bytes");

    serde_json::from_slice(bytes).map_err(|e| {
        error!(
            body = %String::from_utf8_lossy(bytes),
            error = %e,
            "Cannot decode incoming bytes"
        );
        DecodeError(e)
    })
}
