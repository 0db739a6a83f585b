use super::change::Subscription;
use super::health::{HealthCounters, PendingNotification};
use super::order::{OrderAggregate, OrderId};
use super::status::CombinedStatus;
use super::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Read access to order aggregates.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &OrderId) -> Result<Option<OrderAggregate>>;
    /// Batched read. Ids without a record are simply absent from the result.
    async fn get_many(&self, ids: &[OrderId]) -> Result<Vec<OrderAggregate>>;
    async fn all(&self) -> Result<Vec<OrderAggregate>>;
}

/// The privileged aggregate write path.
#[async_trait]
pub trait OrderWriter: Send + Sync {
    async fn upsert(&self, order: OrderAggregate) -> Result<()>;
}

/// Read access to the append-only transaction ledger.
#[async_trait]
pub trait TransactionLedger: Send + Sync {
    /// Rows for one order, newest `created_at` first, at most `limit` rows.
    async fn recent_for_order(&self, id: &OrderId, limit: usize) -> Result<Vec<TransactionRecord>>;
}

/// The provider-callback append path.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    async fn append(&self, record: TransactionRecord) -> Result<()>;
}

/// Single round trip computing an order's consolidated status remotely.
#[async_trait]
pub trait CombinedStatusProcedure: Send + Sync {
    async fn compute(&self, id: &OrderId) -> Result<CombinedStatus>;
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconciliationRequest {
    ReconcileOrder { order_id: OrderId },
    ReconcileAll,
    CheckHealth,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationOutcome {
    Repaired { success: bool, updated: u64 },
    Health(HealthCounters),
}

/// The single privileged repair action.
#[async_trait]
pub trait ReconciliationAction: Send + Sync {
    async fn invoke(&self, request: ReconciliationRequest) -> Result<ReconciliationOutcome>;
}

/// Per-order change notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, id: &OrderId) -> Result<Subscription>;
}

/// Outbound notifications blocked on payment state.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn pending(&self) -> Result<Vec<PendingNotification>>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type OrderWriterRef = Arc<dyn OrderWriter>;
pub type LedgerWriterRef = Arc<dyn LedgerWriter>;
pub type TransactionLedgerRef = Arc<dyn TransactionLedger>;
pub type CombinedStatusRef = Arc<dyn CombinedStatusProcedure>;
pub type ReconciliationRef = Arc<dyn ReconciliationAction>;
pub type ChangeFeedRef = Arc<dyn ChangeFeed>;
pub type NotificationQueueRef = Arc<dyn NotificationQueue>;

/// Explicit data-access client handed to every component at construction.
///
/// Only read ports live here, plus the reconciliation action which is the
/// one sanctioned way to change an aggregate.
#[derive(Clone)]
pub struct DataClient {
    pub orders: OrderStoreRef,
    pub ledger: TransactionLedgerRef,
    pub reconciliation: ReconciliationRef,
    pub combined: Option<CombinedStatusRef>,
    pub changes: Option<ChangeFeedRef>,
}

impl DataClient {
    pub fn new(
        orders: OrderStoreRef,
        ledger: TransactionLedgerRef,
        reconciliation: ReconciliationRef,
    ) -> Self {
        Self {
            orders,
            ledger,
            reconciliation,
            combined: None,
            changes: None,
        }
    }

    pub fn with_combined(mut self, combined: CombinedStatusRef) -> Self {
        self.combined = Some(combined);
        self
    }

    pub fn with_change_feed(mut self, changes: ChangeFeedRef) -> Self {
        self.changes = Some(changes);
        self
    }
}
