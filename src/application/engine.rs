use super::aggregator::{BatchReconcile, MultiOrderAggregator, StatusMap};
use super::health::{HealthMonitor, PeriodicHealth};
use super::reconciler::{AutoReconciler, ManualReconcile};
use super::resolver::StatusResolver;
use super::watcher::PaymentWatcher;
use crate::config::{EngineConfig, ResolveOptions, WatchOptions};
use crate::domain::health::HealthReport;
use crate::domain::order::OrderId;
use crate::domain::ports::DataClient;
use crate::domain::status::PaymentStatusView;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// A repair started in the background by an auto-reconciling resolve.
///
/// Dropping it does not cancel the repair.
pub struct ScheduledRepair {
    handle: JoinHandle<Option<PaymentStatusView>>,
}

impl ScheduledRepair {
    /// Waits for the repair and its delayed re-resolution.
    ///
    /// `None` when the repair failed.
    pub async fn outcome(self) -> Option<PaymentStatusView> {
        match self.handle.await {
            Ok(view) => view,
            Err(e) => {
                warn!(error = %e, "background reconciliation task failed");
                None
            }
        }
    }
}

/// The main entry point for payment status resolution.
///
/// `PaymentStatusEngine` wires the resolver, the auto-reconciler, the batch
/// aggregator and the health monitor around one injected `DataClient`.
/// Resolution never fails: callers always receive a well-formed view.
pub struct PaymentStatusEngine {
    resolver: Arc<StatusResolver>,
    reconciler: Arc<AutoReconciler>,
    aggregator: MultiOrderAggregator,
    health: HealthMonitor,
    config: EngineConfig,
}

impl PaymentStatusEngine {
    /// Creates a new `PaymentStatusEngine`.
    ///
    /// # Arguments
    ///
    /// * `client` - Data access to the aggregate store, ledger and remote procedures.
    /// * `config` - Resolver, reconciliation and watch defaults.
    pub fn new(client: DataClient, config: EngineConfig) -> Self {
        let health = HealthMonitor::new(client.reconciliation.clone());
        let resolver = Arc::new(StatusResolver::new(client, config.resolver.clone()));
        let reconciler = Arc::new(AutoReconciler::new(
            resolver.clone(),
            config.reconcile.clone(),
        ));
        Self {
            aggregator: MultiOrderAggregator::new(resolver.clone()),
            resolver,
            reconciler,
            health,
            config,
        }
    }

    /// Resolves one order.
    ///
    /// The first view is returned as soon as it is known. When it shows
    /// drift and auto-reconcile is on, the repair and its single delayed
    /// re-resolution run in the background.
    pub async fn resolve(&self, order_id: &OrderId, options: ResolveOptions) -> PaymentStatusView {
        self.resolve_with_repair(order_id, options).await.0
    }

    /// Like [`resolve`](Self::resolve), but also hands back the background
    /// repair so the caller can wait for the repaired view.
    pub async fn resolve_with_repair(
        &self,
        order_id: &OrderId,
        options: ResolveOptions,
    ) -> (PaymentStatusView, Option<ScheduledRepair>) {
        let view = self.resolver.resolve(order_id).await;
        if !(options.auto_reconcile && view.needs_reconciliation) {
            return (view, None);
        }
        let reconciler = self.reconciler.clone();
        let order_id = order_id.clone();
        let handle =
            tokio::spawn(async move { reconciler.reconcile_and_refresh(&order_id).await });
        (view, Some(ScheduledRepair { handle }))
    }

    pub async fn resolve_many(&self, order_ids: &[OrderId]) -> StatusMap {
        self.aggregator.resolve_many(order_ids).await
    }

    /// Explicit repair for one order. Always re-resolves afterwards and
    /// returns that view with the repair's success flag.
    pub async fn manual_reconcile(&self, order_id: &OrderId) -> ManualReconcile {
        self.reconciler.manual_reconcile(order_id).await
    }

    /// Bulk repair, then a fresh batch resolution of `order_ids`.
    pub async fn reconcile_all(&self, order_ids: &[OrderId]) -> BatchReconcile {
        self.aggregator.reconcile_all(order_ids).await
    }

    pub async fn check_health(&self) -> Result<HealthReport> {
        self.health.check_health().await
    }

    pub fn spawn_health_checks(&self, period: Duration) -> PeriodicHealth {
        self.health.spawn_periodic(period)
    }

    /// Starts watching one order with the engine's default watch options.
    pub fn watch(&self, order_id: OrderId) -> PaymentWatcher {
        self.watch_with(order_id, self.config.watch.clone())
    }

    pub fn watch_with(&self, order_id: OrderId, options: WatchOptions) -> PaymentWatcher {
        let mut watcher = PaymentWatcher::new(self.resolver.clone(), self.reconciler.clone(), options);
        watcher.set_order_id(Some(order_id));
        watcher
    }
}
