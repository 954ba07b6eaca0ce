//! Local coordinator mock
//!
//! Issues sequential request ids and only delivers when told to, so tests and
//! the simulation decide exactly when (and with what word) a bet settles.

use super::{delivery_channel, DeliveryReceiver, DeliverySender, OutcomeDelivery, RandomnessGateway};
use crate::errors::GatewayError;
use crate::games::types::{RandomWord, RequestId};
use async_trait::async_trait;
use dashmap::DashSet;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub struct MockCoordinator {
    next_id: AtomicU64,
    open: DashSet<RequestId>,
    deliveries: DeliverySender,
    unavailable: AtomicBool,
}

impl MockCoordinator {
    pub fn new() -> (Self, DeliveryReceiver) {
        let (deliveries, receiver) = delivery_channel();
        let coordinator = Self {
            next_id: AtomicU64::new(1),
            open: DashSet::new(),
            deliveries,
            unavailable: AtomicBool::new(false),
        };
        (coordinator, receiver)
    }

    /// Simulate a provider outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Word the mock derives for a request: `sha256(request_id)`
    pub fn derived_word(request_id: RequestId) -> RandomWord {
        RandomWord(Sha256::digest(request_id.0.to_be_bytes()).into())
    }

    /// Deliver the derived word for an open request
    pub fn fulfill(&self, request_id: RequestId) -> Result<RandomWord, GatewayError> {
        let word = Self::derived_word(request_id);
        self.fulfill_with(request_id, word)?;
        Ok(word)
    }

    /// Deliver a chosen word for an open request
    pub fn fulfill_with(&self, request_id: RequestId, word: RandomWord) -> Result<(), GatewayError> {
        if self.open.remove(&request_id).is_none() {
            return Err(GatewayError::UnknownRequest(request_id));
        }
        self.send(request_id, word)
    }

    /// Push a delivery regardless of request state, as a misbehaving provider would
    pub fn redeliver(&self, request_id: RequestId, word: RandomWord) -> Result<(), GatewayError> {
        self.send(request_id, word)
    }

    fn send(&self, request_id: RequestId, random_word: RandomWord) -> Result<(), GatewayError> {
        debug!(request_id = %request_id, "Mock coordinator delivering outcome");
        self.deliveries
            .send(OutcomeDelivery {
                request_id,
                random_word,
            })
            .map_err(|_| GatewayError::ChannelClosed)
    }

    /// Open requests, lowest id first
    pub fn open_requests(&self) -> Vec<RequestId> {
        let mut open: Vec<RequestId> = self.open.iter().map(|id| *id).collect();
        open.sort();
        open
    }
}

#[async_trait]
impl RandomnessGateway for MockCoordinator {
    async fn request_outcome(&self) -> Result<RequestId, GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("mock coordinator switched off".to_string()));
        }

        let request_id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.open.insert(request_id);
        debug!(request_id = %request_id, "Mock coordinator opened request");
        Ok(request_id)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
