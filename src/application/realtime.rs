use crate::domain::change::{ChangeEvent, Subscription};
use crate::domain::order::OrderId;
use crate::domain::ports::ChangeFeed;
use crate::error::Result;
use tracing::debug;

/// Change notifications for a single order.
///
/// Holds the feed subscription for as long as it lives; dropping the
/// listener unsubscribes.
#[derive(Debug)]
pub struct RealtimeListener {
    order_id: OrderId,
    subscription: Subscription,
}

impl RealtimeListener {
    pub async fn open(feed: &dyn ChangeFeed, order_id: &OrderId) -> Result<Self> {
        let subscription = feed.subscribe(order_id).await?;
        debug!(order_id = %order_id, "realtime subscription opened");
        Ok(Self {
            order_id: order_id.clone(),
            subscription,
        })
    }

    pub fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Next event that can change this order's payment state.
    ///
    /// Returns `None` once the feed closes.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        loop {
            let event = self.subscription.recv().await?;
            if event.order_id == self.order_id && event.affects_payment() {
                return Some(event);
            }
        }
    }

    pub fn close(self) {
        debug!(order_id = %self.order_id, "realtime subscription closed");
        self.subscription.unsubscribe();
    }
}
