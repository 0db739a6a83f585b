#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use payrecon::application::engine::PaymentStatusEngine;
use payrecon::config::{EngineConfig, ResolverConfig};
use payrecon::domain::order::{OrderAggregate, OrderId, PaymentStatus};
use payrecon::domain::ports::{
    CombinedStatusProcedure, DataClient, LedgerWriter, OrderStore, OrderWriter,
    ReconciliationAction, ReconciliationOutcome, ReconciliationRequest, TransactionLedger,
    TransactionLedgerRef,
};
use payrecon::domain::status::CombinedStatus;
use payrecon::domain::transaction::{TransactionRecord, TransactionStatus};
use payrecon::error::{PaymentError, Result};
use payrecon::infrastructure::in_memory::{
    InMemoryChangeFeed, InMemoryOrderStore, InMemoryTransactionLedger,
};
use payrecon::infrastructure::local::{LocalCombinedStatus, LocalReconciliation};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Provider confirmation time used by scenario A.
pub fn t_ledger() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Aggregate `paid_at` used by scenario B.
pub fn t_aggregate() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn ledger_row(
    order: &str,
    status: TransactionStatus,
    created_at: DateTime<Utc>,
    channel: Option<&str>,
) -> TransactionRecord {
    TransactionRecord {
        order_id: order.into(),
        status,
        paid_at: status.is_settled().then_some(created_at),
        channel: channel.map(str::to_string),
        provider_reference: Some(format!("pi_{order}")),
        amount: None,
        created_at,
    }
}

pub fn paid_order(id: &str, paid_at: DateTime<Utc>) -> OrderAggregate {
    let mut order = OrderAggregate::new(id, "delivered");
    order.payment_status = PaymentStatus::Paid;
    order.paid_at = Some(paid_at);
    order
}

pub fn ids(raw: &[&str]) -> Vec<OrderId> {
    raw.iter().map(|id| OrderId::from(*id)).collect()
}

/// In-memory stores sharing one change feed.
#[derive(Clone)]
pub struct World {
    pub orders: InMemoryOrderStore,
    pub ledger: InMemoryTransactionLedger,
    pub feed: InMemoryChangeFeed,
}

impl World {
    pub fn new() -> Self {
        let feed = InMemoryChangeFeed::new();
        Self {
            orders: InMemoryOrderStore::new().with_change_feed(feed.clone()),
            ledger: InMemoryTransactionLedger::new().with_change_feed(feed.clone()),
            feed,
        }
    }

    /// A: pending aggregate with a success row. B: paid aggregate, empty
    /// ledger. C: pending aggregate, empty ledger.
    pub async fn scenarios() -> Self {
        let world = Self::new();
        world
            .orders
            .upsert(OrderAggregate::new("A", "confirmed"))
            .await
            .unwrap();
        world
            .ledger
            .append(ledger_row("A", TransactionStatus::Success, t_ledger(), Some("card")))
            .await
            .unwrap();
        world.orders.upsert(paid_order("B", t_aggregate())).await.unwrap();
        world
            .orders
            .upsert(OrderAggregate::new("C", "confirmed"))
            .await
            .unwrap();
        world
    }

    /// Client without a combined procedure; every resolution uses the fallback chain.
    pub fn client(&self) -> DataClient {
        self.client_with_ledger(Arc::new(self.ledger.clone()))
    }

    pub fn client_with_ledger(&self, ledger: TransactionLedgerRef) -> DataClient {
        let orders = Arc::new(self.orders.clone());
        let reconciliation = Arc::new(LocalReconciliation::new(
            orders.clone(),
            orders.clone(),
            Arc::new(self.ledger.clone()),
            10,
        ));
        DataClient::new(orders, ledger, reconciliation)
            .with_change_feed(Arc::new(self.feed.clone()))
    }

    pub fn combined(&self) -> LocalCombinedStatus {
        self.combined_with(ResolverConfig::default())
    }

    pub fn combined_with(&self, config: ResolverConfig) -> LocalCombinedStatus {
        LocalCombinedStatus::new(
            Arc::new(self.orders.clone()),
            Arc::new(self.ledger.clone()),
            config,
        )
    }

    pub fn engine(&self, client: DataClient) -> PaymentStatusEngine {
        PaymentStatusEngine::new(client, EngineConfig::default())
    }

    pub fn engine_with(&self, client: DataClient, resolver: ResolverConfig) -> PaymentStatusEngine {
        let config = EngineConfig {
            resolver,
            ..EngineConfig::default()
        };
        PaymentStatusEngine::new(client, config)
    }
}

/// Combined procedure that is never reachable.
pub struct UnreachableCombined;

#[async_trait]
impl CombinedStatusProcedure for UnreachableCombined {
    async fn compute(&self, _id: &OrderId) -> Result<CombinedStatus> {
        Err(PaymentError::Network("combined status procedure unreachable".to_string()))
    }
}

/// Counts calls to a wrapped combined procedure.
pub struct CountingCombined {
    inner: LocalCombinedStatus,
    calls: AtomicUsize,
}

impl CountingCombined {
    pub fn new(inner: LocalCombinedStatus) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CombinedStatusProcedure for CountingCombined {
    async fn compute(&self, id: &OrderId) -> Result<CombinedStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compute(id).await
    }
}

/// Ledger that fails lookups for selected orders.
pub struct FlakyLedger {
    inner: InMemoryTransactionLedger,
    failing: HashSet<OrderId>,
}

impl FlakyLedger {
    pub fn new(inner: InMemoryTransactionLedger, failing: &[&str]) -> Self {
        Self {
            inner,
            failing: failing.iter().map(|id| OrderId::from(*id)).collect(),
        }
    }
}

#[async_trait]
impl TransactionLedger for FlakyLedger {
    async fn recent_for_order(&self, id: &OrderId, limit: usize) -> Result<Vec<TransactionRecord>> {
        if self.failing.contains(id) {
            return Err(PaymentError::Network(format!("ledger timeout for {id}")));
        }
        self.inner.recent_for_order(id, limit).await
    }
}

/// Aggregate store whose every read fails.
pub struct DownOrderStore;

#[async_trait]
impl OrderStore for DownOrderStore {
    async fn get(&self, _id: &OrderId) -> Result<Option<OrderAggregate>> {
        Err(PaymentError::Network("order store unavailable".to_string()))
    }

    async fn get_many(&self, _ids: &[OrderId]) -> Result<Vec<OrderAggregate>> {
        Err(PaymentError::Network("order store unavailable".to_string()))
    }

    async fn all(&self) -> Result<Vec<OrderAggregate>> {
        Err(PaymentError::Network("order store unavailable".to_string()))
    }
}

/// Repair action that always errors.
pub struct BrokenReconciliation;

#[async_trait]
impl ReconciliationAction for BrokenReconciliation {
    async fn invoke(&self, _request: ReconciliationRequest) -> Result<ReconciliationOutcome> {
        Err(PaymentError::Reconciliation("permission denied".to_string()))
    }
}
