//! Engine event notification system
//!
//! Every state change the ledger or the settlement engine commits is published
//! on a broadcast channel. Subscribers that fall behind see `Lagged` and keep
//! going; publishing never blocks and never fails when nobody listens.

use crate::games::types::{AccountId, BetSlip, Outcome, RequestId};
use crate::units::{Amount, SignedAmount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Observable state changes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EngineEvent {
    BetPlaced {
        account: AccountId,
        request_id: RequestId,
        slip: BetSlip,
        #[serde(with = "crate::units::serde_amount")]
        stake: Amount,
    },
    OutcomeSettled {
        account: AccountId,
        request_id: RequestId,
        outcome: Outcome,
        slip: BetSlip,
        #[serde(with = "crate::units::serde_signed_amount")]
        delta: SignedAmount,
        #[serde(with = "crate::units::serde_amount")]
        new_balance: Amount,
    },
    FundsDeposited {
        account: AccountId,
        #[serde(with = "crate::units::serde_amount")]
        amount: Amount,
        #[serde(with = "crate::units::serde_amount")]
        new_balance: Amount,
    },
    FundsWithdrawn {
        account: AccountId,
        #[serde(with = "crate::units::serde_amount")]
        amount: Amount,
    },
    ReserveChanged {
        #[serde(with = "crate::units::serde_signed_amount")]
        amount: SignedAmount,
        #[serde(with = "crate::units::serde_amount")]
        new_total: Amount,
    },
    RequestRefunded {
        account: AccountId,
        request_id: RequestId,
        #[serde(with = "crate::units::serde_amount")]
        stake: Amount,
    },
}

impl EngineEvent {
    /// Event name as it appears in logs
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::BetPlaced { .. } => "BetPlaced",
            EngineEvent::OutcomeSettled { .. } => "OutcomeSettled",
            EngineEvent::FundsDeposited { .. } => "FundsDeposited",
            EngineEvent::FundsWithdrawn { .. } => "FundsWithdrawn",
            EngineEvent::ReserveChanged { .. } => "ReserveChanged",
            EngineEvent::RequestRefunded { .. } => "RequestRefunded",
        }
    }
}

/// Event with its publication order and time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: EngineEvent,
}

/// Broadcast hub for engine events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event to every current subscriber
    pub fn publish(&self, event: EngineEvent) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(sequence, event = event.name(), "Publishing engine event");

        let envelope = EventEnvelope {
            sequence,
            emitted_at: Utc::now(),
            event,
        };
        // No subscribers is fine.
        let _ = self.sender.send(envelope);
        sequence
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of events published so far
    pub fn published(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1_024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit(amount: Amount) -> EngineEvent {
        EngineEvent::FundsDeposited {
            account: "alice".into(),
            amount,
            new_balance: amount,
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(deposit(1));
        bus.publish(deposit(2));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.event, deposit(2));
        assert_eq!(bus.published(), 2);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(deposit(5)), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(deposit(i));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        // The receiver resumes with the newest retained events.
        assert!(rx.recv().await.is_ok());
    }

    #[test]
    fn test_envelope_json_shape() {
        let envelope = EventEnvelope {
            sequence: 3,
            emitted_at: Utc::now(),
            event: EngineEvent::ReserveChanged {
                amount: -5,
                new_total: 1_000_000_000_000_000,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["event"], "ReserveChanged");
        assert_eq!(json["new_total"], "0.001");
        assert_eq!(json["sequence"], 3);
    }

    #[test]
    fn test_settlement_event_round_trips() {
        let envelope = EventEnvelope {
            sequence: 9,
            emitted_at: Utc::now(),
            event: EngineEvent::OutcomeSettled {
                account: "alice".into(),
                request_id: RequestId(4),
                outcome: Outcome::try_from(10).unwrap(),
                slip: BetSlip::new([1, 2, 3, 4], Vec::<&str>::new()).unwrap(),
                delta: -2_000_000_000_000_000,
                new_balance: 8_000_000_000_000_000,
            },
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"delta\":\"-0.002\""));
        assert!(json.contains("\"slip\":"));

        let decoded: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, envelope);
    }
}
