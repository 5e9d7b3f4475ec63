//! Concurrent contributions against one engine.
//! Totals must equal the sum of entries and never pass the cap, no matter
//! how requests interleave.

use futures::future::join_all;
use poolgame::{
    config::GamesConfig,
    games::types::{GameStatus, GameVariant},
    BroadcastPublisher, GameEngine, GameError, GameEvent, MemoryLedger,
};
use std::collections::HashSet;
use std::sync::Arc;

async fn engine(config: GamesConfig) -> GameEngine {
    GameEngine::spawn(Arc::new(MemoryLedger::new()), BroadcastPublisher::new(4096), config)
        .await
        .expect("engine should spawn")
}

async fn contribute_concurrently(
    engine: &GameEngine,
    variant: GameVariant,
    tasks: usize,
    amount: i64,
) -> Vec<Result<u64, GameError>> {
    let handles: Vec<_> = (0..tasks)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .admit(variant, format!("group-{}", i % 7), amount)
                    .await
                    .map(|entry| entry.amount)
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_risk_admissions_are_all_or_nothing_under_contention() {
    let engine = engine(GamesConfig::default()).await;
    let instance = engine.start(GameVariant::Risk, 1000, 2.0).await.unwrap();

    let results = contribute_concurrently(&engine, GameVariant::Risk, 50, 30).await;

    let admitted: Vec<u64> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(GameError::CapExceeded { .. })))
        .count();

    assert_eq!(admitted.len(), 33);
    assert!(admitted.iter().all(|amount| *amount == 30));
    assert_eq!(rejected, 17);

    let entries = engine.entries(instance.id).await.unwrap();
    let sum: u64 = entries.iter().map(|e| e.amount).sum();
    let active = engine.active_instance(GameVariant::Risk).unwrap();
    assert_eq!(sum, 990);
    assert_eq!(active.total, sum);

    let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, (1..=33).collect::<Vec<u64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_investment_fills_cap_exactly_under_contention() {
    let engine = engine(GamesConfig::default()).await;
    let instance = engine.start(GameVariant::Investment, 1000, 1.5).await.unwrap();

    let results = contribute_concurrently(&engine, GameVariant::Investment, 50, 30).await;

    let admitted: Vec<u64> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(admitted.iter().sum::<u64>(), 1000);
    assert_eq!(admitted.iter().filter(|a| **a == 30).count(), 33);
    assert_eq!(admitted.iter().filter(|a| **a == 10).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(GameError::CapExceeded { .. }))));

    let entries = engine.entries(instance.id).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.is_partial()).count(), 1);
    assert_eq!(entries.iter().map(|e| e.amount).sum::<u64>(), 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_racing_contributions_settles_exactly_what_was_admitted() {
    let engine = engine(GamesConfig::default()).await;
    let instance = engine.start(GameVariant::Investment, 1_000_000, 1.2).await.unwrap();

    let contributions: Vec<_> = (0..100)
        .map(|i| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .admit(GameVariant::Investment, format!("group-{}", i % 5), 100)
                    .await
            })
        })
        .collect();

    let ender = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.end(GameVariant::Investment).await })
    };

    let mut admitted_ids = HashSet::new();
    for handle in contributions {
        match handle.await.expect("task panicked") {
            Ok(entry) => {
                admitted_ids.insert(entry.id);
            }
            Err(GameError::GameEnded { .. }) => {}
            Err(other) => panic!("unexpected rejection: {}", other),
        }
    }
    let settled = ender.await.expect("task panicked").expect("end should succeed");

    let entries = engine.entries(instance.id).await.unwrap();
    let persisted: HashSet<_> = entries.iter().map(|e| e.id).collect();
    assert_eq!(persisted, admitted_ids);

    let sum: u64 = entries.iter().map(|e| e.amount).sum();
    assert_eq!(settled.instance.total, sum);
    assert_eq!(settled.settlement.total, sum);
    assert_eq!(settled.instance.status, GameStatus::Ended);

    // Nothing lands after the end
    let late = engine.admit(GameVariant::Investment, "late", 100).await;
    assert!(matches!(late, Err(GameError::GameEnded { .. })));
    assert_eq!(engine.entries(instance.id).await.unwrap().len(), entries.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_events_are_ordered_per_instance() {
    let engine = engine(GamesConfig::default()).await;
    let mut events = engine.subscribe();
    engine.start(GameVariant::Risk, 10_000, 1.1).await.unwrap();

    let results = contribute_concurrently(&engine, GameVariant::Risk, 40, 25).await;
    assert!(results.iter().all(|r| r.is_ok()));
    engine.end(GameVariant::Risk).await.unwrap();

    let mut last_sequence = None;
    let mut last_total = 0;
    loop {
        let event = events.recv().await.unwrap();
        if let Some(previous) = last_sequence {
            assert_eq!(event.sequence(), previous + 1);
        }
        last_sequence = Some(event.sequence());

        match event {
            GameEvent::ProgressUpdate { total, .. } => {
                assert!(total > last_total);
                last_total = total;
            }
            GameEvent::GameStatusChanged { status: GameStatus::Ended, sequence, .. } => {
                assert_eq!(sequence, 41);
                break;
            }
            GameEvent::GameStatusChanged { .. } => {}
        }
    }
    assert_eq!(last_total, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_variants_progress_independently() {
    let engine = engine(GamesConfig::default()).await;
    engine.start(GameVariant::Investment, 500, 1.0).await.unwrap();
    engine.start(GameVariant::Risk, 500, 1.0).await.unwrap();

    let (investment, risk) = tokio::join!(
        contribute_concurrently(&engine, GameVariant::Investment, 20, 10),
        contribute_concurrently(&engine, GameVariant::Risk, 20, 20),
    );
    assert!(investment.iter().all(|r| r.is_ok()));
    assert!(risk.iter().all(|r| r.is_ok()));

    assert_eq!(engine.active_instance(GameVariant::Investment).unwrap().total, 200);
    assert_eq!(engine.active_instance(GameVariant::Risk).unwrap().total, 400);
}
