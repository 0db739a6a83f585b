use super::resolver::StatusResolver;
use crate::domain::order::{OrderAggregate, OrderId};
use crate::domain::ports::{ReconciliationOutcome, ReconciliationRequest};
use crate::domain::status::PaymentStatusView;
use crate::error::PaymentError;
use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Resolved views keyed by order id.
///
/// The paid/unpaid/drift projections are filters over this map; nothing is
/// stored separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusMap {
    views: BTreeMap<OrderId, PaymentStatusView>,
}

impl StatusMap {
    pub fn get(&self, id: &OrderId) -> Option<&PaymentStatusView> {
        self.views.get(id)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OrderId, &PaymentStatusView)> {
        self.views.iter()
    }

    pub fn paid(&self) -> impl Iterator<Item = (&OrderId, &PaymentStatusView)> {
        self.views.iter().filter(|(_, v)| v.is_paid)
    }

    pub fn unpaid(&self) -> impl Iterator<Item = (&OrderId, &PaymentStatusView)> {
        self.views.iter().filter(|(_, v)| !v.is_paid)
    }

    pub fn needing_reconciliation(&self) -> impl Iterator<Item = (&OrderId, &PaymentStatusView)> {
        self.views.iter().filter(|(_, v)| v.needs_reconciliation)
    }

    fn insert(&mut self, id: OrderId, view: PaymentStatusView) {
        self.views.insert(id, view);
    }
}

impl IntoIterator for StatusMap {
    type Item = (OrderId, PaymentStatusView);
    type IntoIter = std::collections::btree_map::IntoIter<OrderId, PaymentStatusView>;

    fn into_iter(self) -> Self::IntoIter {
        self.views.into_iter()
    }
}

/// Outcome of a bulk repair followed by a fresh batch resolution.
#[derive(Debug, Clone)]
pub struct BatchReconcile {
    pub success: bool,
    pub statuses: StatusMap,
}

/// Resolves many orders at once for dashboards.
///
/// One batched aggregate query, then each order goes through the same
/// precedence as a single resolution, reading the ledger only when the
/// aggregate alone cannot settle the view. A failure on one order never aborts
/// the batch, and every requested id gets an entry.
pub struct MultiOrderAggregator {
    resolver: Arc<StatusResolver>,
}

impl MultiOrderAggregator {
    pub fn new(resolver: Arc<StatusResolver>) -> Self {
        Self { resolver }
    }

    pub async fn resolve_many(&self, ids: &[OrderId]) -> StatusMap {
        let client = self.resolver.client();
        let mut aggregates: HashMap<OrderId, OrderAggregate> = HashMap::new();
        let mut batch_error = None;

        match client.orders.get_many(ids).await {
            Ok(orders) => {
                aggregates.extend(orders.into_iter().map(|o| (o.id.clone(), o)));
            }
            Err(e) => {
                warn!(orders = ids.len(), error = %e, "batched aggregate query failed");
                batch_error = Some(e.to_string());
            }
        }

        let orders: Vec<&OrderAggregate> = aggregates.values().collect();
        let resolved = join_all(
            orders
                .iter()
                .map(|order| self.resolver.resolve_with_aggregate(order)),
        )
        .await;
        let by_id: HashMap<&OrderId, PaymentStatusView> =
            orders.iter().map(|order| &order.id).zip(resolved).collect();

        let now = Utc::now();
        let mut statuses = StatusMap::default();
        for id in ids {
            let view = by_id.get(id).cloned().unwrap_or_else(|| {
                let error = match &batch_error {
                    Some(e) => e.clone(),
                    None => PaymentError::Data(format!("order {id} not found")).to_string(),
                };
                PaymentStatusView::unresolved(error, now)
            });
            statuses.insert(id.clone(), view);
        }
        statuses
    }

    /// Runs the bulk repair action, then resolves the same ids again.
    pub async fn reconcile_all(&self, ids: &[OrderId]) -> BatchReconcile {
        let client = self.resolver.client();
        let success = match client
            .reconciliation
            .invoke(ReconciliationRequest::ReconcileAll)
            .await
        {
            Ok(ReconciliationOutcome::Repaired { success, updated }) => {
                info!(updated, success, "bulk reconciliation completed");
                success
            }
            Ok(other) => {
                warn!(outcome = ?other, "unexpected bulk reconciliation outcome");
                false
            }
            Err(e) => {
                warn!(error = %e, "bulk reconciliation failed");
                false
            }
        };

        BatchReconcile {
            success,
            statuses: self.resolve_many(ids).await,
        }
    }
}
