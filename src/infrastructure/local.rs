//! Local implementations of the remote procedures.
//!
//! `LocalCombinedStatus` and `LocalReconciliation` run against any store
//! implementing the ports, which lets the CLI and the tests exercise the
//! full resolution path without a database server.

use crate::config::ResolverConfig;
use crate::domain::health::HealthCounters;
use crate::domain::order::OrderId;
use crate::domain::ports::{
    CombinedStatusProcedure, NotificationQueueRef, OrderStoreRef, OrderWriterRef,
    ReconciliationAction, ReconciliationOutcome, ReconciliationRequest, TransactionLedgerRef,
};
use crate::domain::status::CombinedStatus;
use crate::domain::transaction::latest_settled;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{info, warn};

/// Computes the combined status in one call, applying the same precedence
/// rule as the client-side fallback.
pub struct LocalCombinedStatus {
    orders: OrderStoreRef,
    ledger: TransactionLedgerRef,
    config: ResolverConfig,
}

impl LocalCombinedStatus {
    pub fn new(orders: OrderStoreRef, ledger: TransactionLedgerRef, config: ResolverConfig) -> Self {
        Self {
            orders,
            ledger,
            config,
        }
    }
}

#[async_trait]
impl CombinedStatusProcedure for LocalCombinedStatus {
    async fn compute(&self, id: &OrderId) -> Result<CombinedStatus> {
        let order = self
            .orders
            .get(id)
            .await?
            .ok_or_else(|| PaymentError::Data(format!("order {id} not found")))?;
        let precedence = self.config.fallback;
        let rows = if CombinedStatus::needs_ledger(&order, precedence) {
            self.ledger
                .recent_for_order(id, self.config.ledger_lookup_limit)
                .await?
        } else {
            Vec::new()
        };
        Ok(CombinedStatus::resolve(&order, latest_settled(&rows), precedence))
    }
}

/// The privileged repair action.
///
/// Marks an aggregate paid when the ledger holds a settled row it has not
/// yet absorbed. Consistent orders are left untouched.
pub struct LocalReconciliation {
    orders: OrderStoreRef,
    writer: OrderWriterRef,
    ledger: TransactionLedgerRef,
    notifications: Option<NotificationQueueRef>,
    lookup_limit: usize,
}

impl LocalReconciliation {
    /// `lookup_limit` bounds how many recent ledger rows are searched for a
    /// settled one, as in `ResolverConfig::ledger_lookup_limit`.
    pub fn new(
        orders: OrderStoreRef,
        writer: OrderWriterRef,
        ledger: TransactionLedgerRef,
        lookup_limit: usize,
    ) -> Self {
        Self {
            orders,
            writer,
            ledger,
            notifications: None,
            lookup_limit,
        }
    }

    pub fn with_notifications(mut self, notifications: NotificationQueueRef) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Returns whether the aggregate was updated.
    async fn reconcile_order(&self, id: &OrderId) -> Result<bool> {
        let Some(mut order) = self.orders.get(id).await? else {
            return Err(PaymentError::Data(format!("order {id} not found")));
        };
        if order.is_paid() {
            return Ok(false);
        }

        let rows = self.ledger.recent_for_order(id, self.lookup_limit).await?;
        let Some(settled) = latest_settled(&rows) else {
            return Ok(false);
        };

        order.mark_paid(settled.paid_at, settled.channel.as_deref());
        self.writer.upsert(order).await?;
        info!(order_id = %id, provider_reference = ?settled.provider_reference, "order aggregate reconciled");
        Ok(true)
    }

    async fn reconcile_all(&self) -> Result<ReconciliationOutcome> {
        let orders = self.orders.all().await?;
        let mut updated = 0;
        let mut failures = 0;
        for order in orders.iter().filter(|o| !o.is_paid()) {
            match self.reconcile_order(&order.id).await {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    failures += 1;
                    warn!(order_id = %order.id, error = %e, "bulk reconciliation skipped order");
                }
            }
        }
        Ok(ReconciliationOutcome::Repaired {
            success: failures == 0,
            updated,
        })
    }

    async fn check_health(&self) -> Result<HealthCounters> {
        let orders = self.orders.all().await?;
        let mut unresolved = HashSet::new();
        let mut inconsistent_orders = 0;
        for order in orders.iter().filter(|o| !o.is_paid()) {
            unresolved.insert(order.id.clone());
            let rows = self.ledger.recent_for_order(&order.id, self.lookup_limit).await?;
            if latest_settled(&rows).is_some() {
                inconsistent_orders += 1;
            }
        }

        let pending_notifications = match &self.notifications {
            Some(queue) => queue
                .pending()
                .await?
                .iter()
                .filter(|n| unresolved.contains(&n.order_id))
                .count() as u64,
            None => 0,
        };

        Ok(HealthCounters {
            inconsistent_orders,
            pending_notifications,
        })
    }
}

#[async_trait]
impl ReconciliationAction for LocalReconciliation {
    async fn invoke(&self, request: ReconciliationRequest) -> Result<ReconciliationOutcome> {
        match request {
            ReconciliationRequest::ReconcileOrder { order_id } => {
                let updated = self.reconcile_order(&order_id).await?;
                Ok(ReconciliationOutcome::Repaired {
                    success: true,
                    updated: u64::from(updated),
                })
            }
            ReconciliationRequest::ReconcileAll => self.reconcile_all().await,
            ReconciliationRequest::CheckHealth => {
                Ok(ReconciliationOutcome::Health(self.check_health().await?))
            }
        }
    }
}
