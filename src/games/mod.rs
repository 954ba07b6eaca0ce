pub mod types;
pub mod wheel;
pub mod payout;
pub mod registry;
pub mod vrf_engine;

pub use types::*;
pub use payout::{compute_delta, payout_multiplier, PayoutCalculator};
pub use registry::{BetRegistry, PendingBet};
pub use vrf_engine::{VrfBundle, VrfOutcomeSigner};
