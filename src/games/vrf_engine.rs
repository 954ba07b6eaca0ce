use crate::errors::GatewayError;
use crate::games::types::RandomWord;
use schnorrkel::context::SigningContext;
use schnorrkel::{Keypair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"roulette-outcome";

/// VRF bundle containing the cryptographic proof behind one random word
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrfBundle {
    /// Hex-encoded VRF output (32 bytes)
    pub vrf_output: String,
    /// Hex-encoded VRF proof (64-byte schnorrkel signature)
    pub vrf_proof: String,
    /// Hex-encoded public key (32 bytes)
    pub public_key: String,
    /// Input message used for VRF
    pub input_message: String,
}

impl VrfBundle {
    /// Random word carried by this bundle
    pub fn random_word(&self) -> Result<RandomWord, GatewayError> {
        let bytes = hex::decode(&self.vrf_output)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid VRF output hex: {}", e)))?;
        let word: [u8; 32] = bytes
            .try_into()
            .map_err(|_| GatewayError::InvalidProof("VRF output must be 32 bytes".to_string()))?;
        Ok(RandomWord(word))
    }
}

/// Signs outcome requests and derives their random words
pub struct VrfOutcomeSigner {
    keypair: Arc<Keypair>,
}

impl VrfOutcomeSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create a signer with a random keypair
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair)
    }

    /// Produce the proof and output for an input message
    pub fn sign(&self, input_message: &str) -> VrfBundle {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(input_message.as_bytes()));
        let signature_bytes = signature.to_bytes();

        // VRF output is the hash of the proof
        let vrf_output = Sha256::digest(signature_bytes);

        VrfBundle {
            vrf_output: hex::encode(vrf_output),
            vrf_proof: hex::encode(signature_bytes),
            public_key: self.public_key_hex(),
            input_message: input_message.to_string(),
        }
    }

    /// Verify a bundle against the input it claims to answer
    pub fn verify_vrf_proof(bundle: &VrfBundle, expected_input: &str) -> Result<bool, GatewayError> {
        if bundle.input_message != expected_input {
            return Ok(false);
        }

        let vrf_output = hex::decode(&bundle.vrf_output)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid VRF output hex: {}", e)))?;
        let vrf_proof = hex::decode(&bundle.vrf_proof)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid VRF proof hex: {}", e)))?;
        let public_key_bytes = hex::decode(&bundle.public_key)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid public key hex: {}", e)))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid public key: {:?}", e)))?;
        let signature = Signature::from_bytes(&vrf_proof)
            .map_err(|e| GatewayError::InvalidProof(format!("Invalid signature: {:?}", e)))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        if public_key
            .verify(ctx.bytes(expected_input.as_bytes()), &signature)
            .is_err()
        {
            return Ok(false);
        }

        let computed_output = Sha256::digest(&vrf_proof);
        Ok(computed_output.as_slice() == vrf_output.as_slice())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.keypair.public.to_bytes())
    }
}
