use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an order aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

/// The primary order record.
///
/// Written by the order-processing path and by the reconciliation action only.
/// The `computed_*` fields are an optional denormalized view maintained
/// alongside the raw status; they are absent on stores that do not keep one.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct OrderAggregate {
    pub id: OrderId,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    /// Workflow state, e.g. `confirmed` or `delivered`.
    pub status: String,
    #[serde(default)]
    pub computed_paid: Option<bool>,
    #[serde(default)]
    pub computed_paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_channel: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub needs_reconciliation: Option<bool>,
}

impl OrderAggregate {
    pub fn new(id: impl Into<OrderId>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payment_status: PaymentStatus::Pending,
            paid_at: None,
            status: status.into(),
            computed_paid: None,
            computed_paid_at: None,
            payment_channel: None,
            payment_method: None,
            needs_reconciliation: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Whether this record carries the denormalized combined view.
    pub fn has_denormalized_view(&self) -> bool {
        self.computed_paid.is_some()
    }

    /// Applies ledger-derived truth to the aggregate.
    ///
    /// Returns `false` when the aggregate was already paid and nothing changed.
    /// `paid_at` is the provider's confirmation time; it stays unset when the
    /// provider reported none.
    pub fn mark_paid(&mut self, paid_at: Option<DateTime<Utc>>, channel: Option<&str>) -> bool {
        if self.is_paid() {
            return false;
        }
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = paid_at;
        if self.payment_channel.is_none() {
            self.payment_channel = channel.map(str::to_string);
        }
        if self.has_denormalized_view() {
            self.computed_paid = Some(true);
            self.computed_paid_at = paid_at;
        }
        self.needs_reconciliation = Some(false);
        true
    }
}
