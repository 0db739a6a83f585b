use crate::config::ResolverConfig;
use crate::domain::order::{OrderAggregate, OrderId};
use crate::domain::ports::DataClient;
use crate::domain::status::{CombinedStatus, PaymentStatusView};
use crate::domain::transaction::{TransactionRecord, latest_settled};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use tracing::{debug, error, warn};

/// Computes one order's consolidated payment status.
///
/// Tries the combined remote procedure first and falls back to direct
/// queries against the aggregate and the ledger. Never fails: every error
/// degrades to a well-formed view.
pub struct StatusResolver {
    client: DataClient,
    config: ResolverConfig,
}

impl StatusResolver {
    pub fn new(client: DataClient, config: ResolverConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &DataClient {
        &self.client
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub async fn resolve(&self, order_id: &OrderId) -> PaymentStatusView {
        if let Some(combined) = &self.client.combined {
            match combined.compute(order_id).await {
                Ok(status) => return status.into_view(Utc::now()),
                Err(e) => {
                    debug!(order_id = %order_id, error = %e, "combined status call failed, using fallback");
                }
            }
        }
        self.fallback(order_id).await
    }

    async fn fallback(&self, order_id: &OrderId) -> PaymentStatusView {
        let order = match self.client.orders.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                let e = PaymentError::Data(format!("order {order_id} not found"));
                warn!(order_id = %order_id, error = %e, "no aggregate for order");
                return PaymentStatusView::unresolved(e.to_string(), Utc::now());
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "payment status resolution failed");
                return PaymentStatusView::unresolved(e.to_string(), Utc::now());
            }
        };

        self.resolve_with_aggregate(&order).await
    }

    /// Newest settled row among the most recent ledger rows for an order.
    pub async fn latest_settled(&self, order_id: &OrderId) -> Result<Option<TransactionRecord>> {
        let rows = self
            .client
            .ledger
            .recent_for_order(order_id, self.config.ledger_lookup_limit)
            .await?;
        Ok(latest_settled(&rows).cloned())
    }

    /// Applies the configured precedence to an aggregate, whether it was read
    /// by the fallback or by a batch. The ledger is only read when the
    /// precedence needs it.
    pub async fn resolve_with_aggregate(&self, order: &OrderAggregate) -> PaymentStatusView {
        let precedence = self.config.fallback;
        if !CombinedStatus::needs_ledger(order, precedence) {
            return CombinedStatus::resolve(order, None, precedence).into_view(Utc::now());
        }
        match self.latest_settled(&order.id).await {
            Ok(latest) => {
                CombinedStatus::resolve(order, latest.as_ref(), precedence).into_view(Utc::now())
            }
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "ledger lookup failed, using aggregate only");
                CombinedStatus::resolve(order, None, precedence)
                    .into_view(Utc::now())
                    .with_error(e.to_string())
            }
        }
    }
}
