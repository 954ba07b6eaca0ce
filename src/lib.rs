//! Roulette wagering ledger and randomness-settlement engine
//!
//! Custodies player balances and a house reserve, accepts roulette bets,
//! requests an outcome from a randomness provider and settles the bet when
//! the outcome is delivered. No unit of currency is created or destroyed
//! outside deposits, withdrawals and owner reserve movements.

pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod games;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod simulation;
pub mod units;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::{Settlement, SettlementEngine};
pub use errors::{ConfigurationError, EngineError, EngineResult, GatewayError, WagerError, WagerResult};
pub use events::{EngineEvent, EventBus, EventEnvelope};
pub use games::{AccountId, BetSlip, NumberBet, Outcome, OutsideBet, PayoutCalculator, RandomWord, RequestId};
pub use gateway::{MockCoordinator, OutcomeDelivery, RandomnessGateway, VrfGateway};
pub use ledger::{AccountLedger, AccountView, FundsTransfer, PendingView, RecordingTransfer, ReserveView};
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use units::{format_units, parse_units, Amount, SignedAmount};
