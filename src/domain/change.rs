use super::order::OrderId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ChangeTable {
    Orders,
    Transactions,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A change notification scoped to one order id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub order_id: OrderId,
}

impl ChangeEvent {
    pub fn order_updated(order_id: OrderId) -> Self {
        Self {
            table: ChangeTable::Orders,
            kind: ChangeKind::Update,
            order_id,
        }
    }

    pub fn transaction_inserted(order_id: OrderId) -> Self {
        Self {
            table: ChangeTable::Transactions,
            kind: ChangeKind::Insert,
            order_id,
        }
    }

    /// Aggregate updates and ledger inserts/updates affect payment state.
    pub fn affects_payment(&self) -> bool {
        match self.table {
            ChangeTable::Orders => self.kind == ChangeKind::Update,
            ChangeTable::Transactions => true,
        }
    }
}

type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// A live subscription to change events.
///
/// The unsubscribe hook runs exactly once: on `unsubscribe()` or on drop.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new(
        events: mpsc::Receiver<ChangeEvent>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Waits for the next event. `None` once the feed has closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}
