use crate::domain::health::HealthReport;
use crate::domain::ports::{ReconciliationOutcome, ReconciliationRef, ReconciliationRequest};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, warn};

/// Last periodic check: a report, or the error shown on the dashboard.
pub type HealthSnapshot = Option<std::result::Result<HealthReport, String>>;

/// System-wide counters for operational dashboards.
///
/// Independent of any single order's resolution path.
#[derive(Clone)]
pub struct HealthMonitor {
    reconciliation: ReconciliationRef,
}

impl HealthMonitor {
    pub fn new(reconciliation: ReconciliationRef) -> Self {
        Self { reconciliation }
    }

    pub async fn check_health(&self) -> Result<HealthReport> {
        match self
            .reconciliation
            .invoke(ReconciliationRequest::CheckHealth)
            .await?
        {
            ReconciliationOutcome::Health(counters) => {
                let report = HealthReport::from_counters(counters, Utc::now());
                if report.needs_attention {
                    warn!(
                        inconsistent_orders = report.inconsistent_orders,
                        pending_notifications = report.pending_notifications,
                        "payment state needs attention"
                    );
                }
                Ok(report)
            }
            other => Err(PaymentError::Reconciliation(format!(
                "unexpected health check outcome: {other:?}"
            ))),
        }
    }

    /// Re-runs the check every `period` until the returned handle is dropped.
    pub fn spawn_periodic(&self, period: Duration) -> PeriodicHealth {
        let (tx, rx) = watch::channel(None);
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = match monitor.check_health().await {
                    Ok(report) => Ok(report),
                    Err(e) => {
                        error!(error = %e, "health check failed");
                        Err(e.to_string())
                    }
                };
                tx.send_replace(Some(snapshot));
            }
        });
        PeriodicHealth { handle, latest: rx }
    }
}

/// Handle to a periodic health check. Dropping it stops the checks.
pub struct PeriodicHealth {
    handle: JoinHandle<()>,
    latest: watch::Receiver<HealthSnapshot>,
}

impl PeriodicHealth {
    pub fn latest(&self) -> HealthSnapshot {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.latest.clone()
    }
}

impl Drop for PeriodicHealth {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
