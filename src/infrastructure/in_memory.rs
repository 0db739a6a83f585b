use crate::domain::change::{ChangeEvent, ChangeKind, ChangeTable, Subscription};
use crate::domain::health::PendingNotification;
use crate::domain::order::{OrderAggregate, OrderId};
use crate::domain::ports::{
    ChangeFeed, LedgerWriter, NotificationQueue, OrderStore, OrderWriter, TransactionLedger,
};
use crate::domain::transaction::TransactionRecord;
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// Buffered events per subscriber before new ones are dropped.
const SUBSCRIBER_BUFFER: usize = 64;

/// A thread-safe in-memory store for order aggregates.
///
/// Publishes change events when attached to an `InMemoryChangeFeed`.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, OrderAggregate>>>,
    feed: Option<InMemoryChangeFeed>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_feed(mut self, feed: InMemoryChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn get(&self, id: &OrderId) -> Result<Option<OrderAggregate>> {
        let orders = self.orders.read().await;
        Ok(orders.get(id).cloned())
    }

    async fn get_many(&self, ids: &[OrderId]) -> Result<Vec<OrderAggregate>> {
        let orders = self.orders.read().await;
        Ok(ids.iter().filter_map(|id| orders.get(id).cloned()).collect())
    }

    async fn all(&self) -> Result<Vec<OrderAggregate>> {
        let orders = self.orders.read().await;
        Ok(orders.values().cloned().collect())
    }
}

#[async_trait]
impl OrderWriter for InMemoryOrderStore {
    async fn upsert(&self, order: OrderAggregate) -> Result<()> {
        let id = order.id.clone();
        let existed = {
            let mut orders = self.orders.write().await;
            orders.insert(id.clone(), order).is_some()
        };
        if let Some(feed) = &self.feed {
            let kind = if existed {
                ChangeKind::Update
            } else {
                ChangeKind::Insert
            };
            feed.publish(ChangeEvent {
                table: ChangeTable::Orders,
                kind,
                order_id: id,
            });
        }
        Ok(())
    }
}

/// A thread-safe in-memory append-only ledger.
#[derive(Default, Clone)]
pub struct InMemoryTransactionLedger {
    rows: Arc<RwLock<HashMap<OrderId, Vec<TransactionRecord>>>>,
    feed: Option<InMemoryChangeFeed>,
}

impl InMemoryTransactionLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_feed(mut self, feed: InMemoryChangeFeed) -> Self {
        self.feed = Some(feed);
        self
    }
}

#[async_trait]
impl TransactionLedger for InMemoryTransactionLedger {
    async fn recent_for_order(&self, id: &OrderId, limit: usize) -> Result<Vec<TransactionRecord>> {
        let rows = self.rows.read().await;
        let mut recent = rows.get(id).cloned().unwrap_or_default();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}

#[async_trait]
impl LedgerWriter for InMemoryTransactionLedger {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        let id = record.order_id.clone();
        self.rows
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .push(record);
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::transaction_inserted(id));
        }
        Ok(())
    }
}

#[derive(Default)]
struct FeedRegistry {
    next_id: u64,
    subscribers: HashMap<OrderId, Vec<(u64, mpsc::Sender<ChangeEvent>)>>,
}

/// In-process change notification channel with per-order fan-out.
#[derive(Default, Clone)]
pub struct InMemoryChangeFeed {
    registry: Arc<Mutex<FeedRegistry>>,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers an event to every live subscriber of its order id.
    pub fn publish(&self, event: ChangeEvent) {
        let mut registry = self.registry.lock();
        if let Some(subscribers) = registry.subscribers.get_mut(&event.order_id) {
            subscribers.retain(|(_, tx)| match tx.try_send(event.clone()) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
            if subscribers.is_empty() {
                registry.subscribers.remove(&event.order_id);
            }
        }
    }

    pub fn subscriber_count(&self, id: &OrderId) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn subscribe(&self, id: &OrderId) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let subscriber_id = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let subscriber_id = registry.next_id;
            registry
                .subscribers
                .entry(id.clone())
                .or_default()
                .push((subscriber_id, tx));
            subscriber_id
        };

        let registry = self.registry.clone();
        let order_id = id.clone();
        Ok(Subscription::new(rx, move || {
            let mut registry = registry.lock();
            if let Some(subscribers) = registry.subscribers.get_mut(&order_id) {
                subscribers.retain(|(sid, _)| *sid != subscriber_id);
                if subscribers.is_empty() {
                    registry.subscribers.remove(&order_id);
                }
            }
        }))
    }
}

/// In-memory outbox of notifications waiting on payment state.
#[derive(Default, Clone)]
pub struct InMemoryNotificationQueue {
    items: Arc<RwLock<Vec<PendingNotification>>>,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, notification: PendingNotification) {
        self.items.write().await.push(notification);
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn pending(&self) -> Result<Vec<PendingNotification>> {
        Ok(self.items.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::transaction::TransactionStatus;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn row(order: &str, minute: u32) -> TransactionRecord {
        TransactionRecord {
            order_id: order.into(),
            status: TransactionStatus::Pending,
            paid_at: None,
            channel: None,
            provider_reference: Some(format!("ref-{minute}")),
            amount: Some(dec!(12.50)),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_order_store() {
        let store = InMemoryOrderStore::new();
        let order = OrderAggregate::new("o-1", "confirmed");

        store.upsert(order.clone()).await.unwrap();
        let retrieved = store.get(&"o-1".into()).await.unwrap().unwrap();
        assert_eq!(retrieved, order);

        assert!(store.get(&"o-2".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_many_skips_missing_ids() {
        let store = InMemoryOrderStore::new();
        store.upsert(OrderAggregate::new("o-1", "confirmed")).await.unwrap();
        store.upsert(OrderAggregate::new("o-3", "confirmed")).await.unwrap();

        let ids: Vec<OrderId> = vec!["o-1".into(), "o-2".into(), "o-3".into()];
        let found = store.get_many(&ids).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_returns_newest_first_with_limit() {
        let ledger = InMemoryTransactionLedger::new();
        for minute in [5, 1, 9, 3] {
            ledger.append(row("o-1", minute)).await.unwrap();
        }
        ledger.append(row("o-2", 7)).await.unwrap();

        let recent = ledger.recent_for_order(&"o-1".into(), 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].provider_reference.as_deref(), Some("ref-9"));
        assert_eq!(recent[1].provider_reference.as_deref(), Some("ref-5"));
        assert_eq!(recent[0].amount, Some(dec!(12.50)));

        assert!(ledger.recent_for_order(&"o-9".into(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feed_is_scoped_by_order_id() {
        let feed = InMemoryChangeFeed::new();
        let orders = InMemoryOrderStore::new().with_change_feed(feed.clone());
        let ledger = InMemoryTransactionLedger::new().with_change_feed(feed.clone());

        let mut sub = feed.subscribe(&"o-1".into()).await.unwrap();
        orders.upsert(OrderAggregate::new("o-2", "confirmed")).await.unwrap();
        orders.upsert(OrderAggregate::new("o-1", "confirmed")).await.unwrap();
        orders.upsert(OrderAggregate::new("o-1", "delivered")).await.unwrap();
        ledger.append(row("o-1", 1)).await.unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Insert);
        assert_eq!(first.order_id, OrderId::from("o-1"));
        assert_eq!(sub.recv().await.unwrap(), ChangeEvent::order_updated("o-1".into()));
        assert_eq!(
            sub.recv().await.unwrap(),
            ChangeEvent::transaction_inserted("o-1".into())
        );
    }

    #[tokio::test]
    async fn test_dropping_subscription_removes_listener() {
        let feed = InMemoryChangeFeed::new();
        let id = OrderId::from("o-1");

        let first = feed.subscribe(&id).await.unwrap();
        let second = feed.subscribe(&id).await.unwrap();
        assert_eq!(feed.subscriber_count(&id), 2);

        drop(first);
        assert_eq!(feed.subscriber_count(&id), 1);
        second.unsubscribe();
        assert_eq!(feed.subscriber_count(&id), 0);
    }

    #[tokio::test]
    async fn test_notification_queue() {
        let queue = InMemoryNotificationQueue::new();
        queue
            .enqueue(PendingNotification {
                order_id: "o-1".into(),
                kind: "receipt".to_string(),
                created_at: Utc::now(),
            })
            .await;
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id.as_str(), "o-1");
    }
}
