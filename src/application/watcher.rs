//! Long-lived payment status tracking for one order at a time.
//!
//! A `PaymentWatcher` runs a background task per order id that combines the
//! poll scheduler, the realtime listener and manual triggers into a single
//! state machine:
//!
//! ```text
//!   Idle/Polling --tick|event|refresh--> Resolving --drift--> Reconciling
//!        ^                                   |                     |
//!        +-----------------------------------+---------------------+
//! ```
//!
//! Changing the order id aborts the task, releases its subscription and
//! bumps a generation counter so any result still in flight is discarded.

use super::poll::PollScheduler;
use super::realtime::RealtimeListener;
use super::reconciler::AutoReconciler;
use super::resolver::StatusResolver;
use crate::config::WatchOptions;
use crate::domain::change::ChangeEvent;
use crate::domain::order::OrderId;
use crate::domain::status::PaymentStatusView;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Resolving,
    Reconciling,
    Polling,
}

enum Command {
    Refresh,
    Reconcile(oneshot::Sender<bool>),
}

struct WatchTask {
    order_id: OrderId,
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

pub struct PaymentWatcher {
    resolver: Arc<StatusResolver>,
    reconciler: Arc<AutoReconciler>,
    options: WatchOptions,
    generation: Arc<AtomicU64>,
    view: Arc<watch::Sender<PaymentStatusView>>,
    state: Arc<watch::Sender<WatchState>>,
    task: Option<WatchTask>,
}

impl PaymentWatcher {
    pub fn new(
        resolver: Arc<StatusResolver>,
        reconciler: Arc<AutoReconciler>,
        options: WatchOptions,
    ) -> Self {
        let (view, _) = watch::channel(PaymentStatusView::loading(Utc::now()));
        let (state, _) = watch::channel(WatchState::Idle);
        Self {
            resolver,
            reconciler,
            options,
            generation: Arc::new(AtomicU64::new(0)),
            view: Arc::new(view),
            state: Arc::new(state),
            task: None,
        }
    }

    /// Points the watcher at another order, or at none.
    ///
    /// Must be called from within a tokio runtime.
    pub fn set_order_id(&mut self, order_id: Option<OrderId>) {
        if self.order_id() == order_id.as_ref() {
            return;
        }
        self.stop();
        self.view.send_replace(PaymentStatusView::loading(Utc::now()));

        let Some(order_id) = order_id else {
            return;
        };
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        let context = WatchContext {
            order_id: order_id.clone(),
            generation: self.generation.load(Ordering::SeqCst),
            current: self.generation.clone(),
            resolver: self.resolver.clone(),
            reconciler: self.reconciler.clone(),
            options: self.options.clone(),
            view: self.view.clone(),
            state: self.state.clone(),
        };
        let handle = tokio::spawn(context.run(receiver));
        self.task = Some(WatchTask {
            order_id,
            commands,
            handle,
        });
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.task.as_ref().map(|t| &t.order_id)
    }

    /// Cancels the running task, its timer and its subscription.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.handle.abort();
            debug!(order_id = %task.order_id, "payment watcher stopped");
        }
        self.state.send_replace(WatchState::Idle);
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentStatusView> {
        self.view.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    pub fn view(&self) -> PaymentStatusView {
        self.view.borrow().clone()
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    pub fn is_paid(&self) -> bool {
        self.view.borrow().is_paid
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.view.borrow().paid_at
    }

    pub fn payment_method(&self) -> Option<String> {
        self.view.borrow().payment_method.clone()
    }

    pub fn needs_reconciliation(&self) -> bool {
        self.view.borrow().needs_reconciliation
    }

    pub fn order_status(&self) -> String {
        self.view.borrow().order_status.clone()
    }

    /// Requests an immediate resolution. Returns `false` when nothing is watched.
    pub fn refresh(&self) -> bool {
        match &self.task {
            // A full queue already holds a pending refresh.
            Some(task) => match task.commands.try_send(Command::Refresh) {
                Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => true,
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    /// Runs the repair action for the watched order and re-resolves it.
    pub async fn manual_reconcile(&self) -> bool {
        let Some(task) = &self.task else {
            return false;
        };
        let (reply, outcome) = oneshot::channel();
        if task.commands.send(Command::Reconcile(reply)).await.is_err() {
            return false;
        }
        outcome.await.unwrap_or(false)
    }
}

impl Drop for PaymentWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WatchContext {
    order_id: OrderId,
    generation: u64,
    current: Arc<AtomicU64>,
    resolver: Arc<StatusResolver>,
    reconciler: Arc<AutoReconciler>,
    options: WatchOptions,
    view: Arc<watch::Sender<PaymentStatusView>>,
    state: Arc<watch::Sender<WatchState>>,
}

impl WatchContext {
    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        let mut listener = self.open_listener().await;
        let mut poll = PollScheduler::new(self.options.poll_interval);

        let view = self.refresh().await;
        poll.observe(&view);

        loop {
            self.set_state(if poll.is_active() {
                WatchState::Polling
            } else {
                WatchState::Idle
            });

            let view = tokio::select! {
                _ = poll.tick() => self.refresh().await,
                event = next_event(&mut listener) => match event {
                    Some(event) => {
                        debug!(order_id = %self.order_id, table = ?event.table, "change event received");
                        self.refresh().await
                    }
                    None => {
                        warn!(order_id = %self.order_id, "change feed closed, relying on polling");
                        listener = None;
                        continue;
                    }
                },
                command = commands.recv() => match command {
                    Some(Command::Refresh) => self.refresh().await,
                    Some(Command::Reconcile(reply)) => {
                        let (success, view) = self.manual_reconcile().await;
                        let _ = reply.send(success);
                        view
                    }
                    None => break,
                },
            };

            let was_polling = poll.is_active();
            poll.observe(&view);
            if was_polling && !poll.is_active() {
                debug!(order_id = %self.order_id, "order paid, polling stopped");
            }
        }

        if let Some(listener) = listener {
            listener.close();
        }
    }

    async fn open_listener(&self) -> Option<RealtimeListener> {
        if !self.options.realtime {
            return None;
        }
        let feed = self.resolver.client().changes.clone()?;
        match RealtimeListener::open(feed.as_ref(), &self.order_id).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                warn!(order_id = %self.order_id, error = %e, "realtime subscription failed, relying on polling");
                None
            }
        }
    }

    async fn refresh(&self) -> PaymentStatusView {
        self.set_state(WatchState::Resolving);
        let view = self.resolver.resolve(&self.order_id).await;
        self.publish(&view);

        if !(self.options.auto_reconcile && view.needs_reconciliation) {
            return view;
        }

        self.set_state(WatchState::Reconciling);
        match self.reconciler.reconcile_and_refresh(&self.order_id).await {
            Some(repaired) => {
                self.publish(&repaired);
                repaired
            }
            None => view,
        }
    }

    async fn manual_reconcile(&self) -> (bool, PaymentStatusView) {
        self.set_state(WatchState::Reconciling);
        let outcome = self.reconciler.manual_reconcile(&self.order_id).await;
        self.publish(&outcome.view);
        (outcome.success, outcome.view)
    }

    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn publish(&self, view: &PaymentStatusView) {
        if self.is_current() {
            self.view.send_replace(view.clone());
        }
    }

    fn set_state(&self, state: WatchState) {
        if self.is_current() {
            self.state.send_replace(state);
        }
    }
}

async fn next_event(listener: &mut Option<RealtimeListener>) -> Option<ChangeEvent> {
    match listener {
        Some(listener) => listener.next().await,
        None => std::future::pending().await,
    }
}
