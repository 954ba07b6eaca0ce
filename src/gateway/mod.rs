//! Randomness provider boundary
//!
//! A gateway hands out a request handle immediately and later pushes exactly
//! one [`OutcomeDelivery`] per handle onto the delivery channel. The engine
//! never assumes exactly-once delivery; the bet registry enforces it.

pub mod mock;
pub mod vrf;

pub use mock::MockCoordinator;
pub use vrf::VrfGateway;

use crate::config::{ProviderKind, RandomnessConfig};
use crate::errors::GatewayError;
use crate::games::types::{RandomWord, RequestId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound half of a randomness provider
#[async_trait]
pub trait RandomnessGateway: Send + Sync {
    /// Ask for an outcome. Returns before any outcome exists.
    async fn request_outcome(&self) -> Result<RequestId, GatewayError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Inbound callback payload: one random word for one handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDelivery {
    pub request_id: RequestId,
    pub random_word: RandomWord,
}

pub type DeliverySender = mpsc::UnboundedSender<OutcomeDelivery>;
pub type DeliveryReceiver = mpsc::UnboundedReceiver<OutcomeDelivery>;

pub fn delivery_channel() -> (DeliverySender, DeliveryReceiver) {
    mpsc::unbounded_channel()
}

/// Gateway built from configuration, keeping the concrete mock reachable
/// so callers can drive fulfilment by hand.
pub enum ConfiguredGateway {
    Mock(Arc<MockCoordinator>),
    Vrf(Arc<VrfGateway>),
}

impl ConfiguredGateway {
    pub fn from_config(config: &RandomnessConfig) -> (Self, DeliveryReceiver) {
        match config.provider {
            ProviderKind::Mock => {
                let (coordinator, deliveries) = MockCoordinator::new();
                (ConfiguredGateway::Mock(Arc::new(coordinator)), deliveries)
            }
            ProviderKind::Vrf => {
                let (gateway, deliveries) = VrfGateway::new(config);
                (ConfiguredGateway::Vrf(Arc::new(gateway)), deliveries)
            }
        }
    }

    pub fn as_gateway(&self) -> Arc<dyn RandomnessGateway> {
        match self {
            ConfiguredGateway::Mock(mock) => mock.clone() as Arc<dyn RandomnessGateway>,
            ConfiguredGateway::Vrf(vrf) => vrf.clone() as Arc<dyn RandomnessGateway>,
        }
    }

    pub fn mock(&self) -> Option<&Arc<MockCoordinator>> {
        match self {
            ConfiguredGateway::Mock(mock) => Some(mock),
            ConfiguredGateway::Vrf(_) => None,
        }
    }
}
