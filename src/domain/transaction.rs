use super::order::OrderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
    Paid,
}

impl TransactionStatus {
    /// `success` and `paid` both confirm the payment.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Success | Self::Paid)
    }
}

/// One row of the append-only payment ledger.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub order_id: OrderId,
    pub status: TransactionStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub provider_reference: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Returns the most recent settled row.
///
/// Rows may arrive in any order; the newest `created_at` wins.
pub fn latest_settled(records: &[TransactionRecord]) -> Option<&TransactionRecord> {
    records
        .iter()
        .filter(|r| r.status.is_settled())
        .max_by_key(|r| r.created_at)
}
