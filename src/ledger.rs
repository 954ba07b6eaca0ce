//! Account ledger and house reserve
//!
//! Each account sits behind its own async mutex so every operation on one
//! account is applied in order, while different accounts proceed in
//! parallel. The reserve has a single mutex. When both are needed the
//! account lock is always taken first.

use crate::config::LedgerConfig;
use crate::errors::{WagerError, WagerResult};
use crate::events::{EngineEvent, EventBus};
use crate::games::types::{AccountId, BetSlip, RequestId};
use crate::metrics::EngineMetrics;
use crate::units::{format_signed, format_units, Amount, SignedAmount};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// External payment step behind withdrawals and reserve drains
#[async_trait]
pub trait FundsTransfer: Send + Sync {
    /// Pay `amount` out to `recipient`. Any error leaves the ledger untouched.
    async fn pay_out(&self, recipient: &AccountId, amount: Amount) -> WagerResult<()>;
}

/// A payment made through [`RecordingTransfer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    pub recipient: AccountId,
    pub amount: Amount,
}

/// In-process transfer that records every payout
#[derive(Default)]
pub struct RecordingTransfer {
    payouts: Mutex<Vec<Payout>>,
    failing: AtomicBool,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following transfer fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn payouts(&self) -> Vec<Payout> {
        self.payouts.lock().await.clone()
    }

    pub async fn total_paid(&self) -> Amount {
        self.payouts.lock().await.iter().map(|p| p.amount).sum()
    }
}

#[async_trait]
impl FundsTransfer for RecordingTransfer {
    async fn pay_out(&self, recipient: &AccountId, amount: Amount) -> WagerResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WagerError::TransferFailed(format!(
                "payment of {} to {} rejected",
                format_units(amount),
                recipient
            )));
        }

        self.payouts.lock().await.push(Payout {
            recipient: recipient.clone(),
            amount,
        });
        Ok(())
    }
}

/// Stake held for a pending request
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hold {
    pub request_id: RequestId,
    pub stake: Amount,
    /// Worst-case payout committed against the reserve
    pub exposure: Amount,
    pub slip: BetSlip,
}

#[derive(Debug, Default)]
pub(crate) struct AccountState {
    /// Spendable balance, excluding any held stake
    pub balance: Amount,
    pub hold: Option<Hold>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct HouseReserve {
    pub balance: Amount,
    /// Sum of the worst-case payouts of all pending bets
    pub locked: Amount,
}

impl HouseReserve {
    pub fn available(&self) -> Amount {
        self.balance.saturating_sub(self.locked)
    }
}

/// Read-only view of a pending bet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingView {
    pub request_id: RequestId,
    #[serde(with = "crate::units::serde_amount")]
    pub stake: Amount,
    pub slip: BetSlip,
}

/// Read-only view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    #[serde(with = "crate::units::serde_amount")]
    pub balance: Amount,
    pub pending: Option<PendingView>,
}

/// Read-only view of the house reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveView {
    #[serde(with = "crate::units::serde_amount")]
    pub balance: Amount,
    #[serde(with = "crate::units::serde_amount")]
    pub locked: Amount,
    #[serde(with = "crate::units::serde_amount")]
    pub available: Amount,
}

pub struct AccountLedger {
    owner: AccountId,
    min_balance: Amount,
    max_balance: Amount,
    accounts: DashMap<AccountId, Arc<Mutex<AccountState>>>,
    reserve: Mutex<HouseReserve>,
    transfer: Arc<dyn FundsTransfer>,
    events: EventBus,
    metrics: EngineMetrics,
}

impl AccountLedger {
    pub fn new(
        config: &LedgerConfig,
        transfer: Arc<dyn FundsTransfer>,
        events: EventBus,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            owner: config.owner.clone(),
            min_balance: config.min_balance,
            max_balance: config.max_balance,
            accounts: DashMap::new(),
            reserve: Mutex::new(HouseReserve::default()),
            transfer,
            events,
            metrics,
        }
    }

    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn min_balance(&self) -> Amount {
        self.min_balance
    }

    pub fn max_balance(&self) -> Amount {
        self.max_balance
    }

    fn ensure_owner(&self, caller: &AccountId) -> WagerResult<()> {
        if caller != &self.owner {
            warn!(caller = %caller, "Rejected owner-only operation");
            return Err(WagerError::NotOwner);
        }
        Ok(())
    }

    fn bounds_check(&self, balance: Amount, amount: Amount) -> WagerResult<Amount> {
        let out_of_bounds = WagerError::OutOfBounds {
            balance,
            amount,
            min: self.min_balance,
            max: self.max_balance,
        };
        match balance.checked_add(amount) {
            Some(next) if next >= self.min_balance && next <= self.max_balance => Ok(next),
            _ => Err(out_of_bounds),
        }
    }

    /// Credit an account. The resulting balance must stay within the configured bounds.
    pub async fn deposit(&self, account: &AccountId, amount: Amount) -> WagerResult<Amount> {
        // New accounts only open once a deposit into them is known to be valid.
        if !self.accounts.contains_key(account) {
            self.bounds_check(0, amount)?;
        }

        let slot = self.accounts.entry(account.clone()).or_default().clone();
        let mut state = slot.lock().await;

        let new_balance = self.bounds_check(state.balance, amount)?;
        state.balance = new_balance;

        info!(
            account = %account,
            amount = %format_units(amount),
            balance = %format_units(new_balance),
            "Funds deposited"
        );
        self.metrics.record_deposit();
        self.events.publish(EngineEvent::FundsDeposited {
            account: account.clone(),
            amount,
            new_balance,
        });
        Ok(new_balance)
    }

    /// Pay out the whole spendable balance. A held stake stays in place.
    pub async fn withdraw(&self, account: &AccountId) -> WagerResult<Amount> {
        let slot = self
            .existing_slot(account)
            .ok_or(WagerError::NothingToWithdraw)?;
        let mut state = slot.lock().await;

        let amount = state.balance;
        if amount == 0 {
            return Err(WagerError::NothingToWithdraw);
        }

        if let Err(e) = self.transfer.pay_out(account, amount).await {
            warn!(account = %account, error = %e, "Withdrawal transfer failed");
            return Err(match e {
                WagerError::TransferFailed(reason) => WagerError::TransferFailed(reason),
                other => WagerError::TransferFailed(other.to_string()),
            });
        }
        state.balance = 0;

        info!(account = %account, amount = %format_units(amount), "Funds withdrawn");
        self.metrics.record_withdrawal();
        self.events.publish(EngineEvent::FundsWithdrawn {
            account: account.clone(),
            amount,
        });
        Ok(amount)
    }

    /// Add owner funds to the house reserve
    pub async fn fund_reserve(&self, caller: &AccountId, amount: Amount) -> WagerResult<Amount> {
        self.ensure_owner(caller)?;

        let mut reserve = self.reserve.lock().await;
        let new_total = reserve
            .balance
            .checked_add(amount)
            .ok_or(WagerError::AmountOverflow)?;
        reserve.balance = new_total;

        info!(amount = %format_units(amount), reserve = %format_units(new_total), "Reserve funded");
        self.publish_reserve_change(amount as SignedAmount, new_total);
        Ok(new_total)
    }

    /// Pay reserve funds out to the owner. Funds backing pending bets cannot be drained.
    pub async fn drain_reserve(&self, caller: &AccountId, amount: Amount) -> WagerResult<Amount> {
        self.ensure_owner(caller)?;

        let mut reserve = self.reserve.lock().await;
        let available = reserve.available();
        if amount > available {
            return Err(WagerError::InsufficientReserve {
                required: amount,
                available,
            });
        }

        if let Err(e) = self.transfer.pay_out(&self.owner, amount).await {
            warn!(error = %e, "Reserve drain transfer failed");
            return Err(match e {
                WagerError::TransferFailed(reason) => WagerError::TransferFailed(reason),
                other => WagerError::TransferFailed(other.to_string()),
            });
        }
        reserve.balance -= amount;
        let new_total = reserve.balance;

        info!(amount = %format_units(amount), reserve = %format_units(new_total), "Reserve drained");
        self.publish_reserve_change(-(amount as SignedAmount), new_total);
        Ok(new_total)
    }

    /// Spendable balance, zero for unknown accounts
    pub async fn balance(&self, account: &AccountId) -> Amount {
        match self.existing_slot(account) {
            Some(slot) => {
                let state = slot.lock().await;
                state.balance
            }
            None => 0,
        }
    }

    pub async fn account(&self, account: &AccountId) -> Option<AccountView> {
        let slot = self.existing_slot(account)?;
        let state = slot.lock().await;
        Some(AccountView {
            balance: state.balance,
            pending: state.hold.as_ref().map(|hold| PendingView {
                request_id: hold.request_id,
                stake: hold.stake,
                slip: hold.slip.clone(),
            }),
        })
    }

    pub async fn reserve(&self) -> ReserveView {
        let reserve = self.reserve.lock().await;
        ReserveView {
            balance: reserve.balance,
            locked: reserve.locked,
            available: reserve.available(),
        }
    }

    /// Every unit in custody: spendable balances, held stakes and the reserve
    pub async fn total_custody(&self) -> Amount {
        let slots: Vec<_> = self.accounts.iter().map(|entry| entry.value().clone()).collect();
        let mut total: Amount = 0;
        for slot in slots {
            let state = slot.lock().await;
            let held = state.hold.as_ref().map_or(0, |hold| hold.stake);
            total = total.saturating_add(state.balance).saturating_add(held);
        }
        total.saturating_add(self.reserve.lock().await.balance)
    }

    fn existing_slot(&self, account: &AccountId) -> Option<Arc<Mutex<AccountState>>> {
        self.accounts.get(account).map(|entry| entry.value().clone())
    }

    fn publish_reserve_change(&self, amount: SignedAmount, new_total: Amount) {
        self.events.publish(EngineEvent::ReserveChanged { amount, new_total });
    }

    // Settlement-only operations. The engine holds the account guard across
    // each of these, which is what keeps one request per account.

    pub(crate) async fn lock_account(&self, account: &AccountId) -> Option<OwnedMutexGuard<AccountState>> {
        let slot = self.existing_slot(account)?;
        Some(slot.lock_owned().await)
    }

    async fn lock_reserve(&self) -> MutexGuard<'_, HouseReserve> {
        self.reserve.lock().await
    }

    /// Lock `exposure` of the reserve for a new bet
    pub(crate) async fn commit_exposure(&self, exposure: Amount) -> WagerResult<()> {
        let mut reserve = self.lock_reserve().await;
        let available = reserve.available();
        if exposure > available {
            return Err(WagerError::InsufficientReserve {
                required: exposure,
                available,
            });
        }
        reserve.locked += exposure;
        debug!(exposure = %format_units(exposure), locked = %format_units(reserve.locked), "Exposure committed");
        Ok(())
    }

    pub(crate) async fn release_exposure(&self, exposure: Amount) {
        let mut reserve = self.lock_reserve().await;
        reserve.locked = reserve.locked.saturating_sub(exposure);
    }

    /// Move the stake out of the spendable balance into a hold
    pub(crate) fn debit_into_hold(state: &mut AccountState, hold: Hold) -> WagerResult<()> {
        if let Some(existing) = &state.hold {
            return Err(WagerError::RequestAlreadyPending(existing.request_id));
        }
        let remaining = state
            .balance
            .checked_sub(hold.stake)
            .ok_or(WagerError::InsufficientFunds {
                required: hold.stake,
                available: state.balance,
            })?;
        state.balance = remaining;
        state.hold = Some(hold);
        Ok(())
    }

    /// Release a hold with a settlement delta.
    ///
    /// The account receives `stake + delta` and the reserve absorbs `-delta`.
    /// Returns the new spendable balance.
    pub(crate) async fn credit_from_hold(
        &self,
        state: &mut AccountState,
        request_id: RequestId,
        delta: SignedAmount,
    ) -> WagerResult<Amount> {
        let hold = match &state.hold {
            Some(hold) if hold.request_id == request_id => hold.clone(),
            _ => return Err(WagerError::UnknownRequest(request_id)),
        };

        let credit = SignedAmount::try_from(hold.stake)
            .ok()
            .and_then(|stake| stake.checked_add(delta))
            .and_then(|credit| Amount::try_from(credit).ok())
            .ok_or(WagerError::AmountOverflow)?;
        let new_balance = state
            .balance
            .checked_add(credit)
            .ok_or(WagerError::AmountOverflow)?;

        let mut reserve = self.lock_reserve().await;
        let new_reserve = if delta >= 0 {
            reserve.balance.checked_sub(delta.unsigned_abs())
        } else {
            reserve.balance.checked_add(delta.unsigned_abs())
        }
        .ok_or(WagerError::InsufficientReserve {
            required: delta.unsigned_abs(),
            available: reserve.balance,
        })?;

        reserve.balance = new_reserve;
        reserve.locked = reserve.locked.saturating_sub(hold.exposure);
        drop(reserve);

        state.balance = new_balance;
        state.hold = None;

        if delta != 0 {
            debug!(delta = %format_signed(-delta), reserve = %format_units(new_reserve), "Reserve settled");
            self.publish_reserve_change(-delta, new_reserve);
        }
        Ok(new_balance)
    }

    /// Return a held stake untouched and release its exposure
    pub(crate) async fn refund_hold(&self, state: &mut AccountState, request_id: RequestId) -> WagerResult<Amount> {
        let hold = match &state.hold {
            Some(hold) if hold.request_id == request_id => hold.clone(),
            _ => return Err(WagerError::UnknownRequest(request_id)),
        };
        let new_balance = state
            .balance
            .checked_add(hold.stake)
            .ok_or(WagerError::AmountOverflow)?;

        self.release_exposure(hold.exposure).await;
        state.balance = new_balance;
        state.hold = None;
        Ok(new_balance)
    }
}
