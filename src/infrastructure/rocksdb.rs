use crate::domain::order::{OrderAggregate, OrderId};
use crate::domain::ports::{LedgerWriter, OrderStore, OrderWriter, TransactionLedger};
use crate::domain::transaction::TransactionRecord;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family for order aggregates, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for ledger rows, keyed by `order_id \0 created_at sequence`.
pub const CF_TRANSACTIONS: &str = "transactions";

const KEY_SEPARATOR: u8 = 0x00;

/// A persistent store for both order aggregates and the transaction ledger.
///
/// Ledger keys sort by order id, then by creation time, so a reverse scan
/// over an order's prefix yields its rows newest first.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_transactions])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::Data(format!("column family {name} not found")))
    }

    fn ledger_prefix(id: &OrderId) -> Vec<u8> {
        let mut prefix = id.as_str().as_bytes().to_vec();
        prefix.push(KEY_SEPARATOR);
        prefix
    }

    fn ledger_key(&self, record: &TransactionRecord) -> Vec<u8> {
        let mut key = Self::ledger_prefix(&record.order_id);
        // Flip the sign bit so negative timestamps still sort before positive ones.
        let micros = (record.created_at.timestamp_micros() as u64) ^ (1 << 63);
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(&self.db.latest_sequence_number().to_be_bytes());
        key
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn get(&self, id: &OrderId) -> Result<Option<OrderAggregate>> {
        let cf = self.cf(CF_ORDERS)?;
        match self.db.get_cf(cf, id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_many(&self, ids: &[OrderId]) -> Result<Vec<OrderAggregate>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::with_capacity(ids.len());
        for result in self
            .db
            .multi_get_cf(ids.iter().map(|id| (cf, id.as_str().as_bytes())))
        {
            if let Some(bytes) = result? {
                orders.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(orders)
    }

    async fn all(&self) -> Result<Vec<OrderAggregate>> {
        let cf = self.cf(CF_ORDERS)?;
        let mut orders = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            orders.push(serde_json::from_slice(&value)?);
        }
        Ok(orders)
    }
}

#[async_trait]
impl OrderWriter for RocksDBStore {
    async fn upsert(&self, order: OrderAggregate) -> Result<()> {
        let cf = self.cf(CF_ORDERS)?;
        let value = serde_json::to_vec(&order)?;
        self.db.put_cf(cf, order.id.as_str().as_bytes(), value)?;
        Ok(())
    }
}

#[async_trait]
impl TransactionLedger for RocksDBStore {
    async fn recent_for_order(&self, id: &OrderId, limit: usize) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let prefix = Self::ledger_prefix(id);
        let mut upper = id.as_str().as_bytes().to_vec();
        upper.push(KEY_SEPARATOR + 1);

        let mut rows = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&upper, Direction::Reverse))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                if &key[..] < prefix.as_slice() {
                    break;
                }
                continue;
            }
            rows.push(serde_json::from_slice(&value)?);
            if rows.len() >= limit {
                break;
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl LedgerWriter for RocksDBStore {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let key = self.ledger_key(&record);
        let value = serde_json::to_vec(&record)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }
}
