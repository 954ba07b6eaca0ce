//! Error types for the roulette settlement engine
//!
//! Ledger and settlement operations report a flat [`WagerError`] so callers can
//! match on the exact rejection. Provider and configuration failures have their
//! own enums and fold into [`EngineError`] at the process boundary.

use crate::games::types::RequestId;
use crate::units::Amount;

/// Rejections produced by the ledger and the settlement engine.
///
/// Every public operation validates before it mutates, so receiving one of
/// these means no balance, hold or registry entry changed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WagerError {
    #[error("Deposit of {amount} would move balance {balance} outside [{min}, {max}]")]
    OutOfBounds {
        balance: Amount,
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Caller is not the owner")]
    NotOwner,

    #[error("Insufficient reserve: required {required}, available {available}")]
    InsufficientReserve { required: Amount, available: Amount },

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("No active bets")]
    NoActiveBets,

    #[error("Request {0} already pending for this account")]
    RequestAlreadyPending(RequestId),

    #[error("Duplicate request: {0}")]
    DuplicateRequest(RequestId),

    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    #[error("Invalid number bet: {0} (must be 0-36)")]
    InvalidNumber(u8),

    #[error("Unknown outside bet category: {0}")]
    UnknownCategory(String),

    #[error("Request {request_id} is {age_secs}s old, refund allowed after {timeout_secs}s")]
    RequestNotExpired {
        request_id: RequestId,
        age_secs: u64,
        timeout_secs: u64,
    },

    #[error("Randomness gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Amount overflow")]
    AmountOverflow,
}

/// Failures raised by a randomness provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider has no open request {0}")]
    UnknownRequest(RequestId),

    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Delivery channel closed")]
    ChannelClosed,
}

impl From<GatewayError> for WagerError {
    fn from(e: GatewayError) -> Self {
        WagerError::GatewayUnavailable(e.to_string())
    }
}

/// Configuration and validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Root error type for process-level operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Wager error: {0}")]
    Wager(#[from] WagerError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type WagerResult<T> = Result<T, WagerError>;

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn test_error_display() {
        let err = WagerError::InsufficientFunds {
            required: 10,
            available: 3,
        };
        assert!(err.to_string().contains("required 10"));
        assert!(err.to_string().contains("available 3"));
    }

    #[test]
    fn test_gateway_error_folds_into_wager_error() {
        let err: WagerError = GatewayError::Unavailable("offline".to_string()).into();
        match err {
            WagerError::GatewayUnavailable(msg) => assert!(msg.contains("offline")),
            other => panic!("Expected gateway error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_conversion_and_source() {
        let config_error = ConfigurationError::ValidationFailed("test".to_string());
        let engine_error: EngineError = config_error.into();

        assert!(engine_error.to_string().contains("Configuration error"));
        assert!(engine_error.source().is_some());
    }
}
