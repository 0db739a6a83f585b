use crate::domain::status::PaymentStatusView;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Periodic re-resolution for an unpaid order.
///
/// Stops for good the first time it observes a paid view. A new scheduler
/// is created on order-id change, which is the only way polling resumes.
pub struct PollScheduler {
    interval: Option<Interval>,
}

impl PollScheduler {
    /// `None` disables polling entirely.
    pub fn new(period: Option<Duration>) -> Self {
        let interval = period.filter(|p| !p.is_zero()).map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { interval }
    }

    pub fn is_active(&self) -> bool {
        self.interval.is_some()
    }

    /// Feeds the latest view; a paid view stops the scheduler.
    pub fn observe(&mut self, view: &PaymentStatusView) {
        if view.is_paid {
            self.interval = None;
        }
    }

    /// Waits for the next tick. Pending forever once stopped.
    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending().await,
        }
    }
}
