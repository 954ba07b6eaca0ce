use crate::errors::{WagerError, WagerResult};
use crate::games::types::{AccountId, BetSlip, RequestId};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Bet waiting for its outcome
#[derive(Debug, Clone)]
pub struct PendingBet {
    pub account: AccountId,
    pub slip: BetSlip,
    pub registered_at: DateTime<Utc>,
}

/// Thread-safe map of outstanding outcome requests.
///
/// `take` removes the entry atomically, so a redelivered outcome can never
/// be applied twice.
#[derive(Clone)]
pub struct BetRegistry {
    /// Map of request id -> pending bet
    pending: Arc<DashMap<RequestId, PendingBet>>,
}

impl BetRegistry {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Register a bet under a freshly issued request handle
    pub fn register(&self, request_id: RequestId, account: AccountId, slip: BetSlip) -> WagerResult<()> {
        match self.pending.entry(request_id) {
            Entry::Occupied(_) => Err(WagerError::DuplicateRequest(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingBet {
                    account,
                    slip,
                    registered_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Remove and return the bet for a handle
    pub fn take(&self, request_id: RequestId) -> WagerResult<PendingBet> {
        self.pending
            .remove(&request_id)
            .map(|(_, bet)| bet)
            .ok_or(WagerError::UnknownRequest(request_id))
    }

    /// Account that owns a request, without removing it
    pub fn account_for(&self, request_id: RequestId) -> Option<AccountId> {
        self.pending.get(&request_id).map(|entry| entry.account.clone())
    }

    pub fn get(&self, request_id: RequestId) -> Option<PendingBet> {
        self.pending.get(&request_id).map(|entry| entry.value().clone())
    }

    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Put a taken bet back under its handle, keeping its registration time
    pub fn restore(&self, request_id: RequestId, bet: PendingBet) {
        self.pending.insert(request_id, bet);
    }
}

impl Default for BetRegistry {
    fn default() -> Self {
        Self::new()
    }
}
