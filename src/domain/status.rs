use super::order::OrderAggregate;
use super::transaction::TransactionRecord;
use crate::config::FallbackPrecedence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment method reported when the aggregate is paid but names no channel.
pub const PROCESSED_METHOD: &str = "processed";

/// Order status reported when no aggregate could be read.
pub const UNKNOWN_ORDER_STATUS: &str = "unknown";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    /// The aggregate alone is authoritative and consistent with the ledger.
    Order,
    /// The ledger is ahead of the aggregate.
    Transaction,
    /// Produced right after a successful repair.
    Reconciled,
    /// No resolution has completed yet.
    Loading,
}

/// Output of the combined status procedure.
///
/// The same shape is produced server-side, from the denormalized view and by
/// the direct query fallback, so every path funnels through one conversion.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CombinedStatus {
    pub final_paid: bool,
    pub final_paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub needs_reconciliation: bool,
    pub order_status: String,
}

impl CombinedStatus {
    /// Applies the precedence rule to an aggregate and its newest settled ledger row.
    ///
    /// `latest_settled` must already be filtered to `success`/`paid` rows.
    pub fn from_records(order: &OrderAggregate, latest_settled: Option<&TransactionRecord>) -> Self {
        let order_paid = order.is_paid();
        let final_paid = order_paid || latest_settled.is_some();
        let needs_reconciliation = !order_paid && latest_settled.is_some();

        let final_paid_at = order
            .paid_at
            .or_else(|| latest_settled.and_then(|t| t.paid_at));

        let payment_method = if order_paid {
            order
                .payment_method
                .clone()
                .or_else(|| order.payment_channel.clone())
                .or_else(|| latest_settled.and_then(|t| t.channel.clone()))
                .or_else(|| Some(PROCESSED_METHOD.to_string()))
        } else if let Some(tx) = latest_settled {
            tx.channel
                .clone()
                .or_else(|| order.payment_method.clone())
                .or_else(|| Some(PROCESSED_METHOD.to_string()))
        } else {
            None
        };

        Self {
            final_paid,
            final_paid_at: if final_paid { final_paid_at } else { None },
            payment_method,
            needs_reconciliation,
            order_status: order.status.clone(),
        }
    }

    /// Reads the denormalized combined view, if the aggregate carries one.
    pub fn from_denormalized(order: &OrderAggregate) -> Option<Self> {
        let final_paid = order.computed_paid?;
        let payment_method = if final_paid {
            order
                .payment_method
                .clone()
                .or_else(|| order.payment_channel.clone())
                .or_else(|| Some(PROCESSED_METHOD.to_string()))
        } else {
            None
        };

        Some(Self {
            final_paid,
            final_paid_at: if final_paid {
                order.computed_paid_at.or(order.paid_at)
            } else {
                None
            },
            payment_method,
            needs_reconciliation: order.needs_reconciliation.unwrap_or(false),
            order_status: order.status.clone(),
        })
    }

    /// Whether `precedence` needs the ledger to settle this aggregate.
    ///
    /// Not needed when the denormalized view is trusted and present, or when
    /// the aggregate is paid and already names its paid time and method.
    pub fn needs_ledger(order: &OrderAggregate, precedence: FallbackPrecedence) -> bool {
        if precedence == FallbackPrecedence::DenormalizedView && order.has_denormalized_view() {
            return false;
        }
        !(order.is_paid()
            && order.paid_at.is_some()
            && (order.payment_method.is_some() || order.payment_channel.is_some()))
    }

    /// The one precedence rule behind the combined procedure, the direct-query
    /// fallback and batch resolution.
    pub fn resolve(
        order: &OrderAggregate,
        latest_settled: Option<&TransactionRecord>,
        precedence: FallbackPrecedence,
    ) -> Self {
        match (precedence, Self::from_denormalized(order)) {
            (FallbackPrecedence::DenormalizedView, Some(denormalized)) => denormalized,
            (FallbackPrecedence::PaidWins, Some(denormalized)) => {
                Self::from_records(order, latest_settled).paid_wins(denormalized)
            }
            _ => Self::from_records(order, latest_settled),
        }
    }

    /// Merges two readings of the same order; paid if either says paid.
    pub fn paid_wins(self, other: Self) -> Self {
        let (primary, secondary) = if self.final_paid || !other.final_paid {
            (self, other)
        } else {
            (other, self)
        };
        Self {
            final_paid: primary.final_paid || secondary.final_paid,
            final_paid_at: primary.final_paid_at.or(secondary.final_paid_at),
            payment_method: primary.payment_method.or(secondary.payment_method),
            needs_reconciliation: primary.needs_reconciliation || secondary.needs_reconciliation,
            order_status: primary.order_status,
        }
    }

    pub fn into_view(self, now: DateTime<Utc>) -> PaymentStatusView {
        let source = if self.needs_reconciliation {
            StatusSource::Transaction
        } else {
            StatusSource::Order
        };
        PaymentStatusView {
            is_paid: self.final_paid,
            paid_at: self.final_paid_at,
            payment_method: self.payment_method,
            source,
            last_updated: now,
            needs_reconciliation: self.needs_reconciliation,
            order_status: self.order_status,
            error: None,
        }
    }
}

/// The resolved, ephemeral projection of payment truth for one order.
///
/// Recomputed on every resolution and never persisted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub source: StatusSource,
    pub last_updated: DateTime<Utc>,
    pub needs_reconciliation: bool,
    pub order_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentStatusView {
    /// Placeholder shown before the first resolution completes.
    pub fn loading(now: DateTime<Utc>) -> Self {
        Self {
            is_paid: false,
            paid_at: None,
            payment_method: None,
            source: StatusSource::Loading,
            last_updated: now,
            needs_reconciliation: false,
            order_status: UNKNOWN_ORDER_STATUS.to_string(),
            error: None,
        }
    }

    /// Safe unpaid view returned when nothing could be resolved.
    pub fn unresolved(error: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source: StatusSource::Order,
            error: Some(error.into()),
            ..Self::loading(now)
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Tags a view produced right after a successful repair.
    ///
    /// Only a view that is now paid and consistent becomes `reconciled`; a
    /// repair that silently failed keeps reporting the ledger as ahead.
    pub fn after_repair(mut self) -> Self {
        if self.is_paid && !self.needs_reconciliation {
            self.source = StatusSource::Reconciled;
        }
        self
    }

    /// Equality on every payment field, ignoring `last_updated` and `source`.
    pub fn same_payment_state(&self, other: &Self) -> bool {
        self.is_paid == other.is_paid
            && self.paid_at == other.paid_at
            && self.payment_method == other.payment_method
            && self.needs_reconciliation == other.needs_reconciliation
            && self.order_status == other.order_status
    }
}
