use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use payrecon::application::engine::PaymentStatusEngine;
use payrecon::config::{EngineConfig, FallbackPrecedence, ResolveOptions, WatchOptions};
use payrecon::domain::order::OrderId;
use payrecon::domain::ports::{
    ChangeFeedRef, DataClient, LedgerWriterRef, OrderStoreRef, OrderWriterRef,
    TransactionLedgerRef,
};
use payrecon::domain::status::StatusSource;
use payrecon::infrastructure::in_memory::{
    InMemoryChangeFeed, InMemoryNotificationQueue, InMemoryOrderStore, InMemoryTransactionLedger,
};
use payrecon::infrastructure::local::{LocalCombinedStatus, LocalReconciliation};
use payrecon::interfaces::csv::notification_reader::NotificationReader;
use payrecon::interfaces::csv::order_reader::OrderReader;
use payrecon::interfaces::csv::status_writer::StatusWriter;
use payrecon::interfaces::csv::transaction_reader::TransactionReader;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Order aggregates CSV to load before running the command
    #[arg(long)]
    orders: Option<PathBuf>,

    /// Transaction ledger CSV to load before running the command
    #[arg(long)]
    transactions: Option<PathBuf>,

    /// Pending notifications CSV counted by the health check
    #[arg(long)]
    notifications: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Precedence used by the direct-query fallback
    #[arg(long, value_enum, default_value_t = Precedence::Denormalized)]
    fallback: Precedence,

    /// Skip the combined status procedure and always use the fallback chain
    #[arg(long)]
    no_combined: bool,

    /// Delay before re-resolving a repaired order
    #[arg(long, default_value_t = 2000)]
    reconcile_delay_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Precedence {
    Denormalized,
    Raw,
    PaidWins,
}

impl From<Precedence> for FallbackPrecedence {
    fn from(value: Precedence) -> Self {
        match value {
            Precedence::Denormalized => FallbackPrecedence::DenormalizedView,
            Precedence::Raw => FallbackPrecedence::RawTables,
            Precedence::PaidWins => FallbackPrecedence::PaidWins,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    Paid,
    Unpaid,
    Drift,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the payment status of one or more orders
    Resolve {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Report drift without repairing it
        #[arg(long)]
        no_auto_reconcile: bool,
    },
    /// Resolve many orders in one batch (all known orders when no id is given)
    Batch {
        ids: Vec<String>,
        #[arg(long, value_enum)]
        filter: Option<Filter>,
    },
    /// Repair one order and report whether the repair succeeded
    Reconcile { id: String },
    /// Repair every drifting order, then resolve them all again
    ReconcileAll,
    /// Print system-wide health counters as JSON
    Health,
    /// Follow one order until it is paid or the timeout expires
    Watch {
        id: String,
        #[arg(long, default_value_t = 30)]
        poll_secs: u64,
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
}

struct Storage {
    orders: OrderStoreRef,
    order_writer: OrderWriterRef,
    ledger: TransactionLedgerRef,
    ledger_writer: LedgerWriterRef,
    changes: Option<ChangeFeedRef>,
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(db_path: Option<PathBuf>) -> Result<Storage> {
    let Some(path) = db_path else {
        return Ok(in_memory_storage());
    };
    let store = Arc::new(
        payrecon::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?,
    );
    Ok(Storage {
        orders: store.clone(),
        order_writer: store.clone(),
        ledger: store.clone(),
        ledger_writer: store,
        changes: None,
    })
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(db_path: Option<PathBuf>) -> Result<Storage> {
    if db_path.is_some() {
        warn!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_storage())
}

fn in_memory_storage() -> Storage {
    let feed = InMemoryChangeFeed::new();
    let orders = Arc::new(InMemoryOrderStore::new().with_change_feed(feed.clone()));
    let ledger = Arc::new(InMemoryTransactionLedger::new().with_change_feed(feed.clone()));
    Storage {
        orders: orders.clone(),
        order_writer: orders,
        ledger: ledger.clone(),
        ledger_writer: ledger,
        changes: Some(Arc::new(feed)),
    }
}

async fn load(storage: &Storage, orders: Option<PathBuf>, transactions: Option<PathBuf>) -> Result<()> {
    if let Some(path) = orders {
        let reader = OrderReader::new(File::open(path).into_diagnostic()?);
        for order in reader.orders() {
            match order {
                Ok(order) => storage.order_writer.upsert(order).await.into_diagnostic()?,
                Err(e) => warn!(error = %e, "Error reading order"),
            }
        }
    }
    if let Some(path) = transactions {
        let reader = TransactionReader::new(File::open(path).into_diagnostic()?);
        for record in reader.transactions() {
            match record {
                Ok(record) => storage.ledger_writer.append(record).await.into_diagnostic()?,
                Err(e) => warn!(error = %e, "Error reading transaction"),
            }
        }
    }
    Ok(())
}

async fn load_notifications(path: Option<PathBuf>) -> Result<InMemoryNotificationQueue> {
    let queue = InMemoryNotificationQueue::new();
    if let Some(path) = path {
        let reader = NotificationReader::new(File::open(path).into_diagnostic()?);
        for notification in reader.notifications() {
            match notification {
                Ok(notification) => queue.enqueue(notification).await,
                Err(e) => warn!(error = %e, "Error reading notification"),
            }
        }
    }
    Ok(queue)
}

async fn known_order_ids(storage: &Storage, ids: Vec<String>) -> Result<Vec<OrderId>> {
    if !ids.is_empty() {
        return Ok(ids.into_iter().map(OrderId::from).collect());
    }
    let mut known: Vec<OrderId> = storage
        .orders
        .all()
        .await
        .into_diagnostic()?
        .into_iter()
        .map(|o| o.id)
        .collect();
    known.sort();
    Ok(known)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let storage = open_storage(cli.db_path)?;
    load(&storage, cli.orders, cli.transactions).await?;
    let notifications = load_notifications(cli.notifications).await?;

    let mut config = EngineConfig::default();
    config.resolver.fallback = cli.fallback.into();
    config.reconcile.delay = Duration::from_millis(cli.reconcile_delay_ms);

    let reconciliation = Arc::new(
        LocalReconciliation::new(
            storage.orders.clone(),
            storage.order_writer.clone(),
            storage.ledger.clone(),
            config.resolver.ledger_lookup_limit,
        )
        .with_notifications(Arc::new(notifications)),
    );
    let mut client = DataClient::new(storage.orders.clone(), storage.ledger.clone(), reconciliation);
    if !cli.no_combined {
        client = client.with_combined(Arc::new(LocalCombinedStatus::new(
            storage.orders.clone(),
            storage.ledger.clone(),
            config.resolver.clone(),
        )));
    }
    if let Some(changes) = storage.changes.clone() {
        client = client.with_change_feed(changes);
    }

    let engine = PaymentStatusEngine::new(client, config);

    let stdout = io::stdout();
    let mut writer = StatusWriter::new(stdout.lock());

    match cli.command {
        Command::Resolve {
            ids,
            no_auto_reconcile,
        } => {
            let options = ResolveOptions {
                auto_reconcile: !no_auto_reconcile,
            };
            let mut repairs = Vec::new();
            for id in ids.into_iter().map(OrderId::from) {
                let (view, repair) = engine.resolve_with_repair(&id, options).await;
                writer.write_view(&id, &view).into_diagnostic()?;
                if let Some(repair) = repair {
                    repairs.push((id, repair));
                }
            }
            writer.flush().into_diagnostic()?;
            // Repaired views follow once their delayed re-resolution lands.
            for (id, repair) in repairs {
                match repair.outcome().await {
                    Some(view) => writer.write_view(&id, &view).into_diagnostic()?,
                    None => eprintln!("Reconciliation failed for order {id}"),
                }
            }
            writer.flush().into_diagnostic()?;
        }
        Command::Batch { ids, filter } => {
            let ids = known_order_ids(&storage, ids).await?;
            let statuses = engine.resolve_many(&ids).await;
            match filter {
                None => writer.write_views(statuses.iter()),
                Some(Filter::Paid) => writer.write_views(statuses.paid()),
                Some(Filter::Unpaid) => writer.write_views(statuses.unpaid()),
                Some(Filter::Drift) => writer.write_views(statuses.needing_reconciliation()),
            }
            .into_diagnostic()?;
        }
        Command::Reconcile { id } => {
            let id = OrderId::from(id);
            let outcome = engine.manual_reconcile(&id).await;
            info!(order_id = %id, success = outcome.success, "manual reconciliation finished");
            writer.write_view(&id, &outcome.view).into_diagnostic()?;
            writer.flush().into_diagnostic()?;
            if !outcome.success {
                eprintln!("Reconciliation failed for order {id}");
            }
        }
        Command::ReconcileAll => {
            let ids = known_order_ids(&storage, Vec::new()).await?;
            let outcome = engine.reconcile_all(&ids).await;
            writer.write_views(outcome.statuses.iter()).into_diagnostic()?;
            if !outcome.success {
                eprintln!("Bulk reconciliation reported failures");
            }
        }
        Command::Health => {
            let report = engine.check_health().await.into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        Command::Watch {
            id,
            poll_secs,
            timeout_secs,
        } => {
            let id = OrderId::from(id);
            let watcher = engine.watch_with(
                id.clone(),
                WatchOptions {
                    poll_interval: Some(Duration::from_secs(poll_secs)),
                    ..WatchOptions::default()
                },
            );
            let mut views = watcher.subscribe();
            let followed = tokio::time::timeout(Duration::from_secs(timeout_secs), async {
                loop {
                    let view = views.borrow_and_update().clone();
                    if view.source != StatusSource::Loading {
                        writer.write_view(&id, &view)?;
                        writer.flush()?;
                        if view.is_paid && !view.needs_reconciliation {
                            break;
                        }
                    }
                    if views.changed().await.is_err() {
                        break;
                    }
                }
                Ok::<_, payrecon::error::PaymentError>(())
            })
            .await;
            match followed {
                Ok(result) => result.into_diagnostic()?,
                Err(_) => eprintln!("Timed out waiting for order {id} to be paid"),
            }
        }
    }

    Ok(())
}
