use super::order::OrderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw counters returned by the `check_health` action.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct HealthCounters {
    pub inconsistent_orders: u64,
    pub pending_notifications: u64,
}

/// System-wide health snapshot for operational dashboards.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub needs_attention: bool,
    pub inconsistent_orders: u64,
    pub pending_notifications: u64,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_counters(counters: HealthCounters, checked_at: DateTime<Utc>) -> Self {
        Self {
            needs_attention: counters.inconsistent_orders > 0 || counters.pending_notifications > 0,
            inconsistent_orders: counters.inconsistent_orders,
            pending_notifications: counters.pending_notifications,
            checked_at,
        }
    }
}

/// An outbound notification waiting on an order's payment state.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PendingNotification {
    pub order_id: OrderId,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}
