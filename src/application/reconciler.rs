use super::resolver::StatusResolver;
use crate::config::ReconcileConfig;
use crate::domain::order::OrderId;
use crate::domain::ports::{ReconciliationOutcome, ReconciliationRequest};
use crate::domain::status::PaymentStatusView;
use crate::error::{PaymentError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of an explicit operator-triggered repair.
#[derive(Debug, Clone)]
pub struct ManualReconcile {
    pub success: bool,
    pub view: PaymentStatusView,
}

/// Repairs drift between the aggregate and the ledger.
///
/// After a successful repair the order is resolved exactly once more, after
/// a fixed delay. There is no retry loop: if the repair silently did
/// nothing, the next drift detection triggers it again.
pub struct AutoReconciler {
    resolver: Arc<StatusResolver>,
    config: ReconcileConfig,
}

impl AutoReconciler {
    pub fn new(resolver: Arc<StatusResolver>, config: ReconcileConfig) -> Self {
        Self { resolver, config }
    }

    /// Invokes the single-order repair action. Failures are logged, not raised.
    pub async fn repair(&self, order_id: &OrderId) -> bool {
        match self.invoke_repair(order_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "order reconciliation failed");
                false
            }
        }
    }

    async fn invoke_repair(&self, order_id: &OrderId) -> Result<()> {
        let request = ReconciliationRequest::ReconcileOrder {
            order_id: order_id.clone(),
        };
        match self.resolver.client().reconciliation.invoke(request).await? {
            ReconciliationOutcome::Repaired { success: true, updated } => {
                debug!(order_id = %order_id, updated, "order reconciliation completed");
                Ok(())
            }
            ReconciliationOutcome::Repaired { success: false, .. } => Err(
                PaymentError::Reconciliation("repair action reported failure".to_string()),
            ),
            other => Err(PaymentError::Reconciliation(format!(
                "unexpected reconciliation outcome: {other:?}"
            ))),
        }
    }

    /// Repairs drift and, on success, re-resolves once after the configured delay.
    ///
    /// Returns `None` when the repair failed; the caller keeps its drifting view.
    pub async fn reconcile_and_refresh(&self, order_id: &OrderId) -> Option<PaymentStatusView> {
        if !self.repair(order_id).await {
            return None;
        }
        tokio::time::sleep(self.config.delay).await;
        Some(self.resolver.resolve(order_id).await.after_repair())
    }

    /// Explicit repair. Always re-resolves afterwards, whatever the outcome.
    pub async fn manual_reconcile(&self, order_id: &OrderId) -> ManualReconcile {
        let success = self.repair(order_id).await;
        let view = self.resolver.resolve(order_id).await;
        let view = if success { view.after_repair() } else { view };
        ManualReconcile { success, view }
    }
}
