//! Operator alerts for batches that could not be fully compensated.

use std::sync::Mutex;

use alz_common::LedgerId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::BatchFailure;
use crate::state::Status;
use crate::telemetry::ALERT_TARGET;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub atomic_id: String,
    pub status: Status,
    pub failure: Option<BatchFailure>,
    /// Ledgers whose compensation did not succeed.
    pub ledgers: Vec<LedgerId>,
    pub message: String,
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, alert: &Alert);
}

/// Emits alerts as `error` events on the alert target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn raise(&self, alert: &Alert) {
        error!(
            target: ALERT_TARGET,
            atomic_id = %alert.atomic_id,
            status = %alert.status,
            ledgers = ?alert.ledgers,
            "{}",
            alert.message
        );
    }
}

/// Keeps raised alerts in memory.
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl MemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().expect("alert sink poisoned").clone()
    }
}

#[async_trait]
impl AlertSink for MemoryAlertSink {
    async fn raise(&self, alert: &Alert) {
        self.alerts
            .lock()
            .expect("alert sink poisoned")
            .push(alert.clone());
    }
}
