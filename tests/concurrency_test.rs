//! Concurrent access to the ledger and settlement engine
//! This validates per-account serialisation, reserve solvency and conservation

use futures::future::join_all;
use roulette_engine::config::EngineConfig;
use roulette_engine::gateway::MockCoordinator;
use roulette_engine::{
    parse_units, AccountId, Amount, BetSlip, RandomWord, RecordingTransfer, RequestId, SettlementEngine, WagerError,
};
use std::sync::Arc;

fn eth(value: &str) -> Amount {
    parse_units(value).expect("valid amount")
}

fn engine() -> (Arc<SettlementEngine>, Arc<MockCoordinator>) {
    let config = EngineConfig::development("owner".into());
    let (coordinator, _deliveries) = MockCoordinator::new();
    let coordinator = Arc::new(coordinator);
    let engine = Arc::new(SettlementEngine::new(
        &config,
        coordinator.clone(),
        Arc::new(RecordingTransfer::new()),
    ));
    (engine, coordinator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bets_cannot_overcommit_reserve() {
    let (engine, _coordinator) = engine();
    // Room for exactly three straight-up bets (35 * 0.0005 each).
    engine.fund_reserve(&"owner".into(), eth("0.0525")).await.unwrap();

    let players: Vec<AccountId> = (0..10).map(|i| AccountId::new(format!("p{}", i))).collect();
    for player in &players {
        engine.deposit(player, eth("0.05")).await.unwrap();
    }

    let attempts = players.iter().cloned().map(|player| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.place_bet(&player, BetSlip::new([17], Vec::<&str>::new()).unwrap()).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let short = results
        .iter()
        .filter(|r| matches!(r, Err(WagerError::InsufficientReserve { .. })))
        .count();
    assert_eq!(accepted, 3);
    assert_eq!(short, 7);

    let reserve = engine.reserve().await;
    assert_eq!(reserve.locked, eth("0.0525"));
    assert_eq!(reserve.available, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_live_request_under_contention() {
    let (engine, _coordinator) = engine();
    engine.fund_reserve(&"owner".into(), eth("10")).await.unwrap();
    let alice = AccountId::from("alice");
    engine.deposit(&alice, eth("0.05")).await.unwrap();

    let attempts = (0..8).map(|n| {
        let engine = engine.clone();
        let alice = alice.clone();
        tokio::spawn(async move { engine.place_bet(&alice, BetSlip::new([n], ["ODD"]).unwrap()).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let accepted: Vec<RequestId> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
    assert_eq!(accepted.len(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| matches!(r, Err(WagerError::RequestAlreadyPending(id)) if *id == accepted[0])));

    // Only one stake left the spendable balance.
    assert_eq!(engine.balance(&alice).await, eth("0.047"));
    assert_eq!(engine.pending_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_deliveries_settle_once() {
    let (engine, _coordinator) = engine();
    engine.fund_reserve(&"owner".into(), eth("1")).await.unwrap();
    let alice = AccountId::from("alice");
    engine.deposit(&alice, eth("0.05")).await.unwrap();

    let request_id = engine
        .place_bet(&alice, BetSlip::new([5], ["RED"]).unwrap())
        .await
        .unwrap();

    let deliveries = (0..6).map(|_| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.settle(request_id, RandomWord::from(5)).await })
    });
    let results: Vec<_> = join_all(deliveries)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| r.as_ref().unwrap_err() == &WagerError::UnknownRequest(request_id)));

    // 5 is red: 35 * 0.0005 + 0.0025
    assert_eq!(engine.balance(&alice).await, eth("0.07"));
    assert_eq!(engine.reserve().await.balance, eth("0.98"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conservation_under_mixed_load() {
    let (engine, coordinator) = engine();
    let owner = AccountId::from("owner");
    engine.fund_reserve(&owner, eth("5")).await.unwrap();

    let players: Vec<AccountId> = (0..16).map(|i| AccountId::new(format!("player-{}", i))).collect();
    let deposits = players.iter().cloned().map(|player| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.deposit(&player, eth("0.08")).await })
    });
    for joined in join_all(deposits).await {
        joined.expect("task panicked").unwrap();
    }
    let funded = eth("5") + eth("0.08") * players.len() as Amount;
    assert_eq!(engine.total_custody().await, funded);

    for round in 0..5u8 {
        let bets = players.iter().cloned().enumerate().map(|(i, player)| {
            let engine = engine.clone();
            let number = (i as u8 + round) % 37;
            tokio::spawn(async move {
                engine
                    .place_bet(&player, BetSlip::new([number], ["EVEN", "SECOND_COLOUMN"]).unwrap())
                    .await
            })
        });
        let placed: Vec<RequestId> = join_all(bets)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked").expect("bet accepted"))
            .collect();

        let settlements = placed.into_iter().map(|request_id| {
            let engine = engine.clone();
            let word = RandomWord::from(request_id.0 * 7 + round as u64);
            tokio::spawn(async move { engine.settle(request_id, word).await })
        });
        for joined in join_all(settlements).await {
            joined.expect("task panicked").expect("settled");
        }
        assert_eq!(engine.total_custody().await, funded);
    }

    assert_eq!(engine.pending_count(), 0);
    assert_eq!(engine.reserve().await.locked, 0);
    // Settled directly, so the mock never saw a fulfilment.
    assert_eq!(coordinator.open_requests().len(), 80);

    let mut withdrawn: Amount = 0;
    for player in &players {
        if let Ok(amount) = engine.withdraw(player).await {
            withdrawn += amount;
        }
    }
    assert_eq!(engine.total_custody().await, funded - withdrawn);
}
