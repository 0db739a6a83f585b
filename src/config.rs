use std::time::Duration;

/// Which reading wins when the direct-query fallback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPrecedence {
    /// Use the aggregate's denormalized fields when present, raw tables otherwise.
    #[default]
    DenormalizedView,
    /// Ignore denormalized fields and always read aggregate plus ledger.
    RawTables,
    /// Read both and report paid if either reading says paid.
    PaidWins,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How many ledger rows to fetch per order, newest first.
    pub ledger_lookup_limit: usize,
    pub fallback: FallbackPrecedence,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ledger_lookup_limit: 10,
            fallback: FallbackPrecedence::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Wait between a successful repair and the single follow-up resolution.
    pub delay: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

/// Options for a one-shot `resolve`.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub auto_reconcile: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            auto_reconcile: true,
        }
    }
}

/// Options for a long-lived watch on one order.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// `None` disables polling.
    pub poll_interval: Option<Duration>,
    pub realtime: bool,
    pub auto_reconcile: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Some(Duration::from_secs(30)),
            realtime: true,
            auto_reconcile: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub reconcile: ReconcileConfig,
    pub watch: WatchOptions,
}
