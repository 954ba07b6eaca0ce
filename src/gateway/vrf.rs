//! Self-hosted VRF provider
//!
//! Each request is answered with a schnorrkel proof over `key_hash:request_id`.
//! The word is derived from the proof, delivered after the configured delay on
//! a background task, and the proof is kept so anyone can verify it later.

use super::{delivery_channel, DeliveryReceiver, DeliverySender, OutcomeDelivery, RandomnessGateway};
use crate::config::RandomnessConfig;
use crate::errors::GatewayError;
use crate::games::types::RequestId;
use crate::games::vrf_engine::{VrfBundle, VrfOutcomeSigner};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct VrfGateway {
    signer: VrfOutcomeSigner,
    key_hash: String,
    next_id: AtomicU64,
    fulfillment_delay: Duration,
    proofs: Arc<DashMap<RequestId, VrfBundle>>,
    deliveries: DeliverySender,
}

impl VrfGateway {
    pub fn new(config: &RandomnessConfig) -> (Self, DeliveryReceiver) {
        Self::with_signer(config, VrfOutcomeSigner::new_random())
    }

    pub fn with_signer(config: &RandomnessConfig, signer: VrfOutcomeSigner) -> (Self, DeliveryReceiver) {
        let (deliveries, receiver) = delivery_channel();
        let gateway = Self {
            signer,
            key_hash: config.key_hash.clone(),
            next_id: AtomicU64::new(1),
            fulfillment_delay: Duration::from_millis(config.fulfillment_delay_ms),
            proofs: Arc::new(DashMap::new()),
            deliveries,
        };
        (gateway, receiver)
    }

    fn input_for(&self, request_id: RequestId) -> String {
        format!("{}:{}", self.key_hash, request_id)
    }

    /// Proof bundle issued for a request
    pub fn proof(&self, request_id: RequestId) -> Option<VrfBundle> {
        self.proofs.get(&request_id).map(|entry| entry.value().clone())
    }

    /// Check the stored proof against the input the request must have used
    pub fn verify(&self, request_id: RequestId) -> Result<bool, GatewayError> {
        let bundle = self
            .proof(request_id)
            .ok_or(GatewayError::UnknownRequest(request_id))?;
        VrfOutcomeSigner::verify_vrf_proof(&bundle, &self.input_for(request_id))
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }
}

#[async_trait]
impl RandomnessGateway for VrfGateway {
    async fn request_outcome(&self) -> Result<RequestId, GatewayError> {
        let request_id = RequestId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let bundle = self.signer.sign(&self.input_for(request_id));
        let random_word = bundle
            .random_word()
            .map_err(|e| GatewayError::ProofGeneration(e.to_string()))?;
        self.proofs.insert(request_id, bundle);

        let deliveries = self.deliveries.clone();
        let delay = self.fulfillment_delay;
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            debug!(request_id = %request_id, "VRF provider delivering outcome");
            if deliveries
                .send(OutcomeDelivery {
                    request_id,
                    random_word,
                })
                .is_err()
            {
                warn!(request_id = %request_id, "Delivery channel closed before VRF fulfilment");
            }
        });

        Ok(request_id)
    }

    fn name(&self) -> &'static str {
        "vrf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderKind, SEPOLIA_CHAIN_ID};

    fn config(delay_ms: u64) -> RandomnessConfig {
        RandomnessConfig {
            fulfillment_delay_ms: delay_ms,
            ..RandomnessConfig::for_chain(SEPOLIA_CHAIN_ID)
        }
    }

    #[tokio::test]
    async fn test_delivery_matches_stored_proof() {
        let (gateway, mut rx) = VrfGateway::new(&config(0));
        assert_eq!(config(0).provider, ProviderKind::Vrf);

        let id = gateway.request_outcome().await.unwrap();
        let delivery = rx.recv().await.unwrap();

        assert_eq!(delivery.request_id, id);
        let bundle = gateway.proof(id).unwrap();
        assert_eq!(bundle.random_word().unwrap(), delivery.random_word);
        assert!(gateway.verify(id).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_waits_for_delay() {
        let (gateway, mut rx) = VrfGateway::new(&config(500));
        gateway.request_outcome().await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unknown_request_cannot_be_verified() {
        let (gateway, _rx) = VrfGateway::new(&config(0));
        assert_eq!(
            gateway.verify(RequestId(99)),
            Err(GatewayError::UnknownRequest(RequestId(99)))
        );
    }
}
