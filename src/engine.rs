//! Settlement engine
//!
//! Orchestrates the two-phase bet lifecycle: `place_bet` validates, holds the
//! stake and requests an outcome; `settle` (driven by the provider's delivery)
//! prices the bet and moves the money. The engine is the only component that
//! touches the ledger and the bet registry together, and it does so while
//! holding the account's lock.

use crate::config::EngineConfig;
use crate::errors::{WagerError, WagerResult};
use crate::events::{EngineEvent, EventBus, EventEnvelope};
use crate::gateway::{DeliveryReceiver, OutcomeDelivery, RandomnessGateway};
use crate::games::payout::PayoutCalculator;
use crate::games::registry::BetRegistry;
use crate::games::types::{AccountId, BetSlip, Outcome, RandomWord, RequestId};
use crate::ledger::{AccountLedger, AccountView, FundsTransfer, Hold, ReserveView};
use crate::metrics::EngineMetrics;
use crate::units::{format_signed, format_units, Amount, SignedAmount};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of applying one outcome to one pending bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub account: AccountId,
    pub request_id: RequestId,
    pub outcome: Outcome,
    pub slip: BetSlip,
    #[serde(with = "crate::units::serde_signed_amount")]
    pub delta: SignedAmount,
    #[serde(with = "crate::units::serde_amount")]
    pub new_balance: Amount,
}

pub struct SettlementEngine {
    ledger: AccountLedger,
    registry: BetRegistry,
    calculator: PayoutCalculator,
    gateway: Arc<dyn RandomnessGateway>,
    events: EventBus,
    metrics: EngineMetrics,
    request_timeout: chrono::Duration,
}

impl SettlementEngine {
    pub fn new(
        config: &EngineConfig,
        gateway: Arc<dyn RandomnessGateway>,
        transfer: Arc<dyn FundsTransfer>,
    ) -> Self {
        let events = EventBus::new(config.monitoring.event_buffer);
        let metrics = EngineMetrics::new();
        let ledger = AccountLedger::new(&config.ledger, transfer, events.clone(), metrics.clone());
        let calculator = PayoutCalculator::new(&config.table);
        let request_timeout = request_timeout(config.randomness.request_timeout_secs);

        info!(
            owner = %config.ledger.owner,
            provider = gateway.name(),
            straight_unit = %format_units(calculator.straight_unit()),
            outside_unit = %format_units(calculator.outside_unit()),
            request_timeout_secs = request_timeout.num_seconds(),
            "Settlement engine created"
        );

        Self {
            ledger,
            registry: BetRegistry::new(),
            calculator,
            gateway,
            events,
            metrics,
            request_timeout,
        }
    }

    // Ledger entry points

    pub async fn deposit(&self, account: &AccountId, amount: Amount) -> WagerResult<Amount> {
        self.ledger.deposit(account, amount).await
    }

    pub async fn withdraw(&self, account: &AccountId) -> WagerResult<Amount> {
        self.ledger.withdraw(account).await
    }

    pub async fn fund_reserve(&self, caller: &AccountId, amount: Amount) -> WagerResult<Amount> {
        self.ledger.fund_reserve(caller, amount).await
    }

    pub async fn drain_reserve(&self, caller: &AccountId, amount: Amount) -> WagerResult<Amount> {
        self.ledger.drain_reserve(caller, amount).await
    }

    /// Place a bet and request its outcome.
    ///
    /// On success the stake is held, the worst-case payout is locked in the
    /// reserve and the returned handle is pending. On failure nothing changed.
    pub async fn place_bet(&self, account: &AccountId, slip: BetSlip) -> WagerResult<RequestId> {
        match self.try_place_bet(account, slip).await {
            Ok(request_id) => {
                self.metrics.record_bet_placed();
                Ok(request_id)
            }
            Err(e) => {
                warn!(account = %account, error = %e, "Bet rejected");
                self.metrics.record_bet_rejected();
                Err(e)
            }
        }
    }

    async fn try_place_bet(&self, account: &AccountId, slip: BetSlip) -> WagerResult<RequestId> {
        if slip.is_empty() {
            return Err(WagerError::NoActiveBets);
        }
        let stake = self
            .calculator
            .total_stake(&slip)
            .ok_or(WagerError::AmountOverflow)?;
        let exposure = self
            .calculator
            .max_payout(&slip)
            .ok_or(WagerError::AmountOverflow)?;

        let mut state = self
            .ledger
            .lock_account(account)
            .await
            .ok_or(WagerError::InsufficientFunds {
                required: stake,
                available: 0,
            })?;

        if state.balance < stake {
            return Err(WagerError::InsufficientFunds {
                required: stake,
                available: state.balance,
            });
        }

        self.ledger.commit_exposure(exposure).await?;

        if let Some(hold) = &state.hold {
            let pending = hold.request_id;
            self.ledger.release_exposure(exposure).await;
            return Err(WagerError::RequestAlreadyPending(pending));
        }

        let request_id = match self.gateway.request_outcome().await {
            Ok(request_id) => request_id,
            Err(e) => {
                self.ledger.release_exposure(exposure).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.registry.register(request_id, account.clone(), slip.clone()) {
            self.ledger.release_exposure(exposure).await;
            return Err(e);
        }

        let hold = Hold {
            request_id,
            stake,
            exposure,
            slip: slip.clone(),
        };
        if let Err(e) = AccountLedger::debit_into_hold(&mut state, hold) {
            let _ = self.registry.take(request_id);
            self.ledger.release_exposure(exposure).await;
            return Err(e);
        }

        info!(
            account = %account,
            request_id = %request_id,
            stake = %format_units(stake),
            exposure = %format_units(exposure),
            "Bet placed"
        );
        self.events.publish(EngineEvent::BetPlaced {
            account: account.clone(),
            request_id,
            slip,
            stake,
        });
        Ok(request_id)
    }

    /// Apply a delivered random word to its pending bet.
    ///
    /// Fails with `UnknownRequest`, touching nothing, when the handle was
    /// never issued or has already been settled or refunded.
    pub async fn settle(&self, request_id: RequestId, random_word: RandomWord) -> WagerResult<Settlement> {
        let account = self
            .registry
            .account_for(request_id)
            .ok_or(WagerError::UnknownRequest(request_id))?;

        let mut state = self
            .ledger
            .lock_account(&account)
            .await
            .ok_or(WagerError::UnknownRequest(request_id))?;

        // A concurrent delivery or refund may have won the race for this handle.
        match &state.hold {
            Some(hold) if hold.request_id == request_id => {}
            _ => return Err(WagerError::UnknownRequest(request_id)),
        }
        let bet = self.registry.take(request_id)?;

        let outcome = Outcome::from_random_word(&random_word);
        let delta = self.calculator.compute_delta(outcome, &bet.slip);
        let new_balance = match self.ledger.credit_from_hold(&mut state, request_id, delta).await {
            Ok(new_balance) => new_balance,
            Err(e) => {
                // The hold is still in place, so the request must stay refundable.
                self.registry.restore(request_id, bet);
                return Err(e);
            }
        };

        info!(
            account = %account,
            request_id = %request_id,
            outcome = %outcome,
            delta = %format_signed(delta),
            balance = %format_units(new_balance),
            "Outcome settled"
        );
        self.events.publish(EngineEvent::OutcomeSettled {
            account: account.clone(),
            request_id,
            outcome,
            slip: bet.slip.clone(),
            delta,
            new_balance,
        });
        self.metrics.record_settlement();

        Ok(Settlement {
            account,
            request_id,
            outcome,
            slip: bet.slip,
            delta,
            new_balance,
        })
    }

    /// Delivery callback. Never fails towards the provider; unknown handles
    /// are logged and counted instead.
    pub async fn on_outcome_delivered(&self, delivery: OutcomeDelivery) -> Option<Settlement> {
        match self.settle(delivery.request_id, delivery.random_word).await {
            Ok(settlement) => Some(settlement),
            Err(WagerError::UnknownRequest(request_id)) => {
                warn!(request_id = %request_id, "Outcome delivered for unknown request, ignoring");
                self.metrics.record_unknown_delivery();
                None
            }
            Err(e) => {
                error!(request_id = %delivery.request_id, error = %e, "Failed to apply delivered outcome");
                None
            }
        }
    }

    /// Owner-only refund of a request the provider never answered.
    ///
    /// The held stake goes back to the account untouched. A delivery arriving
    /// afterwards is absorbed as unknown.
    pub async fn refund_stale_request(&self, caller: &AccountId, request_id: RequestId) -> WagerResult<Amount> {
        if caller != self.ledger.owner() {
            return Err(WagerError::NotOwner);
        }

        let pending = self
            .registry
            .get(request_id)
            .ok_or(WagerError::UnknownRequest(request_id))?;
        let age = Utc::now() - pending.registered_at;
        if age < self.request_timeout {
            return Err(WagerError::RequestNotExpired {
                request_id,
                age_secs: age.num_seconds().max(0) as u64,
                timeout_secs: self.request_timeout.num_seconds().max(0) as u64,
            });
        }

        let mut state = self
            .ledger
            .lock_account(&pending.account)
            .await
            .ok_or(WagerError::UnknownRequest(request_id))?;
        let stake = match &state.hold {
            Some(hold) if hold.request_id == request_id => hold.stake,
            _ => return Err(WagerError::UnknownRequest(request_id)),
        };
        let bet = self.registry.take(request_id)?;
        let new_balance = match self.ledger.refund_hold(&mut state, request_id).await {
            Ok(new_balance) => new_balance,
            Err(e) => {
                self.registry.restore(request_id, bet);
                return Err(e);
            }
        };

        info!(
            account = %pending.account,
            request_id = %request_id,
            stake = %format_units(stake),
            balance = %format_units(new_balance),
            "Stale request refunded"
        );
        self.metrics.record_refund();
        self.events.publish(EngineEvent::RequestRefunded {
            account: pending.account,
            request_id,
            stake,
        });
        Ok(stake)
    }

    /// Feed every delivery from the provider into the engine
    pub fn spawn_delivery_listener(self: &Arc<Self>, mut deliveries: DeliveryReceiver) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            debug!("Delivery listener started");
            while let Some(delivery) = deliveries.recv().await {
                engine.on_outcome_delivered(delivery).await;
            }
            debug!("Delivery channel closed, listener stopping");
        })
    }

    /// Net delta of a slip for an outcome, using this table's stake units
    pub fn compute_delta(&self, outcome: Outcome, slip: &BetSlip) -> SignedAmount {
        self.calculator.compute_delta(outcome, slip)
    }

    // Accessors

    pub fn owner(&self) -> &AccountId {
        self.ledger.owner()
    }

    pub fn min_balance(&self) -> Amount {
        self.ledger.min_balance()
    }

    pub fn max_balance(&self) -> Amount {
        self.ledger.max_balance()
    }

    pub fn calculator(&self) -> &PayoutCalculator {
        &self.calculator
    }

    pub async fn reserve(&self) -> ReserveView {
        self.ledger.reserve().await
    }

    pub async fn account(&self, account: &AccountId) -> Option<AccountView> {
        self.ledger.account(account).await
    }

    pub async fn balance(&self, account: &AccountId) -> Amount {
        self.ledger.balance(account).await
    }

    pub async fn total_custody(&self) -> Amount {
        self.ledger.total_custody().await
    }

    pub fn pending_count(&self) -> usize {
        self.registry.pending_count()
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.registry.is_pending(request_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn prometheus_metrics(&self) -> String {
        self.metrics.to_prometheus_format(self.registry.pending_count())
    }
}

/// Refund timeout as a chrono duration, saturating at the largest representable span
fn request_timeout(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
