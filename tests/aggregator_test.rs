mod common;

use common::{DownOrderStore, FlakyLedger, World, ids, ledger_row, paid_order, t_aggregate, t_ledger};
use payrecon::config::{FallbackPrecedence, ResolveOptions, ResolverConfig};
use payrecon::domain::order::{OrderAggregate, OrderId};
use payrecon::domain::ports::{DataClient, LedgerWriter, OrderWriter};
use payrecon::domain::status::{PaymentStatusView, StatusSource};
use payrecon::domain::transaction::TransactionStatus;
use payrecon::infrastructure::local::LocalReconciliation;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeSet;
use std::sync::Arc;

fn keys<'a>(entries: impl Iterator<Item = (&'a OrderId, &'a PaymentStatusView)>) -> Vec<&'a str> {
    entries.map(|(id, _)| id.as_str()).collect()
}

#[tokio::test]
async fn test_resolve_many_matches_single_order_resolution() {
    let world = World::scenarios().await;
    let engine = world.engine(world.client().with_combined(Arc::new(world.combined())));

    let statuses = engine.resolve_many(&ids(&["A", "B", "C"])).await;
    assert_eq!(statuses.len(), 3);

    for id in ids(&["A", "B", "C"]) {
        let single = engine
            .resolve(&id, ResolveOptions { auto_reconcile: false })
            .await;
        let batched = statuses.get(&id).unwrap();
        assert!(batched.same_payment_state(&single), "order {id}");
        assert_eq!(batched.source, single.source);
    }
}

async fn single_and_batched(
    world: &World,
    id: &str,
    precedence: FallbackPrecedence,
    with_combined: bool,
) -> (PaymentStatusView, PaymentStatusView) {
    let config = ResolverConfig {
        fallback: precedence,
        ..ResolverConfig::default()
    };
    let mut client = world.client();
    if with_combined {
        client = client.with_combined(Arc::new(world.combined_with(config.clone())));
    }
    let engine = world.engine_with(client, config);
    let id = OrderId::from(id);
    let single = engine
        .resolve(&id, ResolveOptions { auto_reconcile: false })
        .await;
    let batched = engine.resolve_many(std::slice::from_ref(&id)).await;
    (single, batched.get(&id).unwrap().clone())
}

#[tokio::test]
async fn test_paid_aggregate_takes_method_from_ledger_in_both_paths() {
    let world = World::new();
    world.orders.upsert(paid_order("P", t_aggregate())).await.unwrap();
    world
        .ledger
        .append(ledger_row("P", TransactionStatus::Success, t_ledger(), Some("card")))
        .await
        .unwrap();

    for with_combined in [false, true] {
        let (single, batched) =
            single_and_batched(&world, "P", FallbackPrecedence::default(), with_combined).await;
        assert_eq!(single.payment_method.as_deref(), Some("card"));
        assert_eq!(batched.payment_method.as_deref(), Some("card"));
        assert!(batched.same_payment_state(&single));
    }
}

#[tokio::test]
async fn test_denormalized_view_agrees_across_paths() {
    let world = World::new();
    let mut order = OrderAggregate::new("D", "confirmed");
    order.computed_paid = Some(true);
    order.computed_paid_at = Some(t_ledger());
    world.orders.upsert(order).await.unwrap();

    let expectations = [
        (FallbackPrecedence::DenormalizedView, true),
        (FallbackPrecedence::RawTables, false),
        (FallbackPrecedence::PaidWins, true),
    ];
    for (precedence, paid) in expectations {
        for with_combined in [false, true] {
            let (single, batched) = single_and_batched(&world, "D", precedence, with_combined).await;
            assert_eq!(single.is_paid, paid, "{precedence:?} combined={with_combined}");
            assert!(
                batched.same_payment_state(&single),
                "{precedence:?} combined={with_combined}"
            );
        }
    }
}

#[tokio::test]
async fn test_projections_filter_the_map() {
    let world = World::scenarios().await;
    let engine = world.engine(world.client());

    let statuses = engine.resolve_many(&ids(&["A", "B", "C"])).await;
    assert_eq!(keys(statuses.paid()), vec!["A", "B"]);
    assert_eq!(keys(statuses.unpaid()), vec!["C"]);
    assert_eq!(keys(statuses.needing_reconciliation()), vec!["A"]);
}

#[tokio::test]
async fn test_unknown_ids_still_get_an_entry() {
    let world = World::scenarios().await;
    let engine = world.engine(world.client());

    let statuses = engine.resolve_many(&ids(&["A", "ghost"])).await;
    assert_eq!(statuses.len(), 2);
    let ghost = statuses.get(&"ghost".into()).unwrap();
    assert!(!ghost.is_paid);
    assert_eq!(ghost.order_status, "unknown");
    assert!(ghost.error.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_every_id_is_reported_when_all_queries_fail() {
    let world = World::scenarios().await;
    let client = DataClient::new(
        Arc::new(DownOrderStore),
        Arc::new(world.ledger.clone()),
        Arc::new(LocalReconciliation::new(
            Arc::new(DownOrderStore),
            Arc::new(world.orders.clone()),
            Arc::new(world.ledger.clone()),
            10,
        )),
    );
    let engine = world.engine(client);

    let requested = ids(&["A", "B", "C", "D"]);
    let statuses = engine.resolve_many(&requested).await;
    assert_eq!(statuses.len(), requested.len());
    for (id, view) in statuses.iter() {
        assert!(!view.is_paid, "order {id}");
        assert_eq!(view.source, StatusSource::Order);
        assert!(view.error.as_deref().unwrap().contains("unavailable"));
    }
}

#[tokio::test]
async fn test_partial_ledger_failure_isolated_to_its_order() {
    let world = World::scenarios().await;
    world
        .ledger
        .append(ledger_row("C", TransactionStatus::Paid, t_ledger(), None))
        .await
        .unwrap();
    let ledger = Arc::new(FlakyLedger::new(world.ledger.clone(), &["A"]));
    let engine = world.engine(world.client_with_ledger(ledger));

    let statuses = engine.resolve_many(&ids(&["A", "B", "C"])).await;
    let a = statuses.get(&"A".into()).unwrap();
    assert!(!a.is_paid);
    assert!(a.error.is_some());

    let b = statuses.get(&"B".into()).unwrap();
    assert!(b.is_paid);
    assert_eq!(b.error, None);

    let c = statuses.get(&"C".into()).unwrap();
    assert!(c.is_paid);
    assert!(c.needs_reconciliation);
    assert_eq!(c.payment_method.as_deref(), Some("processed"));
}

#[tokio::test]
async fn test_duplicate_ids_collapse_to_one_entry() {
    let world = World::scenarios().await;
    let engine = world.engine(world.client());

    let statuses = engine.resolve_many(&ids(&["C", "A", "C"])).await;
    assert_eq!(statuses.len(), 2);
    assert!(statuses.get(&"A".into()).unwrap().is_paid);
}

#[tokio::test]
async fn test_reconcile_all_repairs_then_resolves() {
    let world = World::scenarios().await;
    let engine = world.engine(world.client());

    let outcome = engine.reconcile_all(&ids(&["A", "B", "C"])).await;
    assert!(outcome.success);
    assert_eq!(outcome.statuses.len(), 3);
    assert_eq!(outcome.statuses.needing_reconciliation().count(), 0);

    let a = outcome.statuses.get(&"A".into()).unwrap();
    assert!(a.is_paid);
    assert_eq!(a.paid_at, Some(t_ledger()));
    assert_eq!(a.source, StatusSource::Order);
}

#[tokio::test]
async fn test_random_batches_cover_every_requested_id() {
    let world = World::scenarios().await;
    let mut rng = rand::thread_rng();
    let mut known = Vec::new();
    for i in 0..20 {
        let id = format!("known-{i}");
        world
            .orders
            .upsert(OrderAggregate::new(id.as_str(), "confirmed"))
            .await
            .unwrap();
        if rng.gen_bool(0.3) {
            world
                .ledger
                .append(ledger_row(&id, TransactionStatus::Success, t_ledger(), Some("card")))
                .await
                .unwrap();
        }
        known.push(OrderId::from(id));
    }
    let engine = world.engine(world.client());

    for _ in 0..5 {
        let amount = rng.gen_range(1..known.len());
        let mut requested: Vec<OrderId> = known
            .choose_multiple(&mut rng, amount)
            .cloned()
            .collect();
        requested.push(OrderId::from(format!("unknown-{}", rng.gen_range(0..1000))));
        requested.shuffle(&mut rng);

        let statuses = engine.resolve_many(&requested).await;
        let expected: BTreeSet<&OrderId> = requested.iter().collect();
        let actual: BTreeSet<&OrderId> = statuses.iter().map(|(id, _)| id).collect();
        assert_eq!(actual, expected);
    }
}
