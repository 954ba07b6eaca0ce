//! End-to-end bet lifecycle through the provider delivery channel
//! This validates deposit -> bet -> fulfilment -> settlement -> withdrawal

use roulette_engine::config::{EngineConfig, SEPOLIA_CHAIN_ID};
use roulette_engine::gateway::{MockCoordinator, VrfGateway};
use roulette_engine::{
    parse_units, AccountId, Amount, BetSlip, EngineEvent, RandomWord, RecordingTransfer, SettlementEngine,
    SignedAmount, WagerError,
};
use std::sync::Arc;
use std::time::Duration;

fn eth(value: &str) -> Amount {
    parse_units(value).expect("valid amount")
}

async fn wait_for_settlements(engine: &SettlementEngine, count: u64) {
    for _ in 0..200 {
        if engine.metrics().snapshot().settlements >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("bets still pending after waiting for delivery");
}

#[tokio::test]
async fn test_full_cycle_with_mock_coordinator() {
    let config = EngineConfig::development("deployer".into());
    let (coordinator, deliveries) = MockCoordinator::new();
    let coordinator = Arc::new(coordinator);
    let transfer = Arc::new(RecordingTransfer::new());
    let engine = Arc::new(SettlementEngine::new(&config, coordinator.clone(), transfer.clone()));
    let listener = engine.spawn_delivery_listener(deliveries);

    let deployer = AccountId::from("deployer");
    let player = AccountId::from("player");
    engine.fund_reserve(&deployer, eth("1")).await.unwrap();
    engine.deposit(&player, eth("0.1")).await.unwrap();
    let custody_before = engine.total_custody().await;

    let mut events = engine.subscribe();
    let slip = BetSlip::new([1, 2, 3, 4], ["THIRD_COLOUMN", "ONE_TO_TWELVE"]).unwrap();
    let request_id = engine.place_bet(&player, slip.clone()).await.unwrap();

    let view = engine.account(&player).await.unwrap();
    let pending = view.pending.expect("bet should be pending");
    assert_eq!(pending.slip, slip);
    assert_eq!(pending.stake, eth("0.007"));

    // Outcome 1: straight win on 1, first dozen wins, third column loses.
    coordinator.fulfill_with(request_id, RandomWord::from(1)).unwrap();
    wait_for_settlements(&engine, 1).await;

    let expected_delta = eth("0.016") + eth("0.005") - eth("0.0025");
    assert_eq!(engine.balance(&player).await, eth("0.1") + expected_delta);
    assert_eq!(engine.reserve().await.balance, eth("1") - expected_delta);
    assert_eq!(engine.total_custody().await, custody_before);

    let mut saw_settlement = false;
    while let Ok(envelope) = events.try_recv() {
        if let EngineEvent::OutcomeSettled { delta, outcome, .. } = envelope.event {
            assert_eq!(outcome.number(), 1);
            assert_eq!(delta, expected_delta as SignedAmount);
            saw_settlement = true;
        }
    }
    assert!(saw_settlement);

    // The balance may now sit above max; withdrawal still pays everything out.
    let paid = engine.withdraw(&player).await.unwrap();
    assert_eq!(paid, eth("0.1") + expected_delta);
    assert_eq!(transfer.total_paid().await, paid);

    listener.abort();
}

#[tokio::test]
async fn test_redelivery_is_absorbed() {
    let config = EngineConfig::development("deployer".into());
    let (coordinator, deliveries) = MockCoordinator::new();
    let coordinator = Arc::new(coordinator);
    let engine = Arc::new(SettlementEngine::new(
        &config,
        coordinator.clone(),
        Arc::new(RecordingTransfer::new()),
    ));
    engine.spawn_delivery_listener(deliveries);

    let player = AccountId::from("player");
    engine.fund_reserve(&"deployer".into(), eth("1")).await.unwrap();
    engine.deposit(&player, eth("0.05")).await.unwrap();

    let request_id = engine
        .place_bet(&player, BetSlip::new([10], ["BLACK"]).unwrap())
        .await
        .unwrap();
    coordinator.fulfill(request_id).unwrap();
    wait_for_settlements(&engine, 1).await;
    let settled_balance = engine.balance(&player).await;

    coordinator.redeliver(request_id, RandomWord::from(10)).unwrap();
    for _ in 0..50 {
        if engine.metrics().snapshot().unknown_deliveries == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(engine.metrics().snapshot().unknown_deliveries, 1);
    assert_eq!(engine.metrics().snapshot().settlements, 1);
    assert_eq!(engine.balance(&player).await, settled_balance);
    assert!(engine.prometheus_metrics().contains("roulette_unknown_deliveries_total 1"));
}

#[tokio::test]
async fn test_vrf_provider_settles_on_its_own() {
    let mut config = EngineConfig::for_chain("deployer".into(), SEPOLIA_CHAIN_ID);
    config.randomness.fulfillment_delay_ms = 10;
    let (gateway, deliveries) = VrfGateway::new(&config.randomness);
    let gateway = Arc::new(gateway);
    let engine = Arc::new(SettlementEngine::new(
        &config,
        gateway.clone(),
        Arc::new(RecordingTransfer::new()),
    ));
    engine.spawn_delivery_listener(deliveries);

    let player = AccountId::from("player");
    engine.fund_reserve(&"deployer".into(), eth("1")).await.unwrap();
    engine.deposit(&player, eth("0.05")).await.unwrap();

    let slip = BetSlip::new([0, 36], ["RED"]).unwrap();
    let request_id = engine.place_bet(&player, slip.clone()).await.unwrap();
    wait_for_settlements(&engine, 1).await;

    // The settled delta must match the outcome proven by the stored bundle.
    let bundle = gateway.proof(request_id).unwrap();
    assert!(gateway.verify(request_id).unwrap());
    let outcome = roulette_engine::Outcome::from_random_word(&bundle.random_word().unwrap());
    let delta = engine.compute_delta(outcome, &slip);
    let expected = (eth("0.05") as SignedAmount + delta) as Amount;
    assert_eq!(engine.balance(&player).await, expected);
}

#[tokio::test]
async fn test_owner_only_reserve_operations() {
    let config = EngineConfig::development("deployer".into());
    let (coordinator, _deliveries) = MockCoordinator::new();
    let engine = SettlementEngine::new(&config, Arc::new(coordinator), Arc::new(RecordingTransfer::new()));

    let stranger = AccountId::from("stranger");
    assert_eq!(
        engine.fund_reserve(&stranger, eth("1")).await.unwrap_err(),
        WagerError::NotOwner
    );
    assert_eq!(
        engine.drain_reserve(&stranger, eth("1")).await.unwrap_err(),
        WagerError::NotOwner
    );

    assert_eq!(engine.owner(), &AccountId::from("deployer"));
    assert_eq!(engine.min_balance(), eth("0.01"));
    assert_eq!(engine.max_balance(), eth("0.1"));
    assert_eq!(engine.reserve().await.balance, 0);
}
