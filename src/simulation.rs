//! House-edge simulation
//!
//! Drives a full engine with seeded random players: deposits, bets, provider
//! fulfilment and settlement, then checks that every unit is accounted for.

use crate::config::EngineConfig;
use crate::engine::SettlementEngine;
use crate::errors::{EngineResult, GatewayError, WagerError};
use crate::gateway::{ConfiguredGateway, DeliveryReceiver};
use crate::games::types::{AccountId, BetSlip, NumberBet, OutsideBet, RandomWord, RequestId, POCKETS};
use crate::ledger::RecordingTransfer;
use crate::units::{Amount, SignedAmount};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Simulation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationConfig {
    pub rounds: u32,
    pub players: u32,
    pub seed: u64,
    /// Owner funding placed in the reserve before the first round
    pub reserve: Amount,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: 100,
            players: 10,
            seed: 42,
            reserve: 10 * crate::units::ONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub rounds: u32,
    pub players: u32,
    pub bets_placed: u64,
    pub bets_rejected: u64,
    pub settlements: u64,
    pub top_ups: u64,
    #[serde(with = "crate::units::serde_amount")]
    pub total_staked: Amount,
    /// Reserve change over the run
    #[serde(with = "crate::units::serde_signed_amount")]
    pub house_net: SignedAmount,
    pub observed_edge: f64,
    pub expected_edge: f64,
    /// Sum of settlement deltas mirrors the reserve change
    pub deltas_balance_reserve: bool,
    /// Custody equals funding plus deposits minus withdrawals
    pub custody_conserved: bool,
}

pub struct HouseEdgeSimulation {
    engine_config: EngineConfig,
    config: SimulationConfig,
}

impl HouseEdgeSimulation {
    pub fn new(engine_config: EngineConfig, config: SimulationConfig) -> Self {
        Self { engine_config, config }
    }

    pub async fn run(self) -> EngineResult<SimulationReport> {
        let (gateway, mut deliveries) = ConfiguredGateway::from_config(&self.engine_config.randomness);
        let transfer = Arc::new(RecordingTransfer::new());
        let engine = SettlementEngine::new(&self.engine_config, gateway.as_gateway(), transfer);
        let owner = engine.owner().clone();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let players: Vec<AccountId> = (0..self.config.players)
            .map(|i| AccountId::new(format!("player-{}", i)))
            .collect();

        engine.fund_reserve(&owner, self.config.reserve).await?;
        let reserve_start = engine.reserve().await.balance;
        let mut deposited: Amount = 0;
        let mut withdrawn: Amount = 0;
        let mut top_ups = 0u64;
        let mut total_staked: Amount = 0;
        let mut bets_rejected = 0u64;
        let mut delta_sum: SignedAmount = 0;
        let mut settlements = 0u64;

        let bankroll = engine.max_balance();
        for player in &players {
            deposited += engine.deposit(player, bankroll).await?;
        }

        info!(
            rounds = self.config.rounds,
            players = self.config.players,
            seed = self.config.seed,
            "Starting house edge simulation"
        );

        for round in 0..self.config.rounds {
            let mut placed: Vec<RequestId> = Vec::with_capacity(players.len());

            for player in &players {
                let slip = random_slip(&mut rng)?;
                let stake = engine
                    .calculator()
                    .total_stake(&slip)
                    .ok_or(WagerError::AmountOverflow)?;

                if engine.balance(player).await < stake {
                    withdrawn += engine.withdraw(player).await.unwrap_or(0);
                    deposited += engine.deposit(player, bankroll).await?;
                    top_ups += 1;
                }

                match engine.place_bet(player, slip).await {
                    Ok(request_id) => {
                        total_staked += stake;
                        placed.push(request_id);
                    }
                    Err(WagerError::InsufficientReserve { .. }) => bets_rejected += 1,
                    Err(e) => return Err(e.into()),
                }
            }

            if let Some(mock) = gateway.mock() {
                for request_id in &placed {
                    let mut word = [0u8; 32];
                    rng.fill(&mut word);
                    mock.fulfill_with(*request_id, RandomWord(word))?;
                }
            }

            let wait = Duration::from_secs(self.engine_config.randomness.request_timeout_secs.max(1));
            for _ in 0..placed.len() {
                let delivery = next_delivery(&mut deliveries, wait).await?;
                if let Some(settlement) = engine.on_outcome_delivered(delivery).await {
                    delta_sum += settlement.delta;
                    settlements += 1;
                }
            }
            debug!(round, settled = placed.len(), "Round complete");
        }

        let reserve_end = engine.reserve().await.balance;
        let house_net = reserve_end as SignedAmount - reserve_start as SignedAmount;
        let custody = engine.total_custody().await;
        let expected_custody = self.config.reserve + deposited - withdrawn;

        let observed_edge = if total_staked == 0 {
            0.0
        } else {
            house_net as f64 / total_staked as f64
        };

        let report = SimulationReport {
            rounds: self.config.rounds,
            players: self.config.players,
            bets_placed: engine.metrics().snapshot().bets_placed,
            bets_rejected,
            settlements,
            top_ups,
            total_staked,
            house_net,
            observed_edge,
            expected_edge: 1.0 / POCKETS as f64,
            deltas_balance_reserve: delta_sum == -house_net,
            custody_conserved: custody == expected_custody,
        };

        info!(
            settlements = report.settlements,
            observed_edge = report.observed_edge,
            conserved = report.custody_conserved,
            "Simulation finished"
        );
        Ok(report)
    }
}

async fn next_delivery(
    deliveries: &mut DeliveryReceiver,
    wait: Duration,
) -> EngineResult<crate::gateway::OutcomeDelivery> {
    match tokio::time::timeout(wait, deliveries.recv()).await {
        Ok(Some(delivery)) => Ok(delivery),
        Ok(None) => Err(GatewayError::ChannelClosed.into()),
        Err(_) => Err(GatewayError::Unavailable("timed out waiting for outcome delivery".to_string()).into()),
    }
}

/// Up to three straight bets and two outside bets, never empty
fn random_slip(rng: &mut StdRng) -> Result<BetSlip, WagerError> {
    let number_count = rng.gen_range(0..=3);
    let numbers = (0..number_count)
        .map(|_| NumberBet::try_from(rng.gen_range(0..POCKETS)))
        .collect::<Result<Vec<_>, _>>()?;

    let outside_count = rng.gen_range(0..=2);
    let mut outside: Vec<OutsideBet> = OutsideBet::ALL
        .choose_multiple(rng, outside_count)
        .copied()
        .collect();

    if numbers.is_empty() && outside.is_empty() {
        outside.push(OutsideBet::Red);
    }
    Ok(BetSlip { numbers, outside })
}
