//! Net payout calculation
//!
//! Odds are derived from coverage: a wager covering `k` of the 36 non-zero
//! pockets pays `36 / k - 1` to one. That yields 35:1 for a single number,
//! 2:1 for dozens and columns, and 1:1 for the 18-pocket groups. Zero is never
//! covered by an outside group, which is where the house edge comes from.

use crate::config::TableConfig;
use crate::games::types::{BetSlip, NumberBet, Outcome, OutsideBet};
use crate::units::{Amount, SignedAmount};

/// Winning multiplier (excluding the returned stake) for a given coverage
pub fn payout_multiplier(coverage: usize) -> u32 {
    if coverage == 0 {
        return 0;
    }
    (36 / coverage as u32).saturating_sub(1)
}

/// Net monetary delta of a set of wagers for one outcome.
///
/// Positive means the player is up, negative means the stakes went to the
/// house. The stake itself is never part of the result.
pub fn compute_delta(
    outcome: Outcome,
    numbers: &[NumberBet],
    outside: &[OutsideBet],
    straight_unit: Amount,
    outside_unit: Amount,
) -> SignedAmount {
    let straight = to_signed(straight_unit);
    let outside_stake = to_signed(outside_unit);
    let straight_odds = payout_multiplier(1) as SignedAmount;

    let number_delta = numbers.iter().fold(0 as SignedAmount, |acc, bet| {
        if bet.wins(outcome) {
            acc.saturating_add(straight.saturating_mul(straight_odds))
        } else {
            acc.saturating_sub(straight)
        }
    });

    outside.iter().fold(number_delta, |acc, bet| {
        if bet.wins(outcome) {
            let odds = payout_multiplier(bet.members().len()) as SignedAmount;
            acc.saturating_add(outside_stake.saturating_mul(odds))
        } else {
            acc.saturating_sub(outside_stake)
        }
    })
}

fn to_signed(amount: Amount) -> SignedAmount {
    SignedAmount::try_from(amount).unwrap_or(SignedAmount::MAX)
}

/// Payout calculator bound to a table's stake units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayoutCalculator {
    straight_unit: Amount,
    outside_unit: Amount,
}

impl PayoutCalculator {
    pub fn new(table: &TableConfig) -> Self {
        Self::with_units(table.straight_unit, table.outside_unit)
    }

    pub fn with_units(straight_unit: Amount, outside_unit: Amount) -> Self {
        Self {
            straight_unit,
            outside_unit,
        }
    }

    pub fn straight_unit(&self) -> Amount {
        self.straight_unit
    }

    pub fn outside_unit(&self) -> Amount {
        self.outside_unit
    }

    pub fn compute_delta(&self, outcome: Outcome, slip: &BetSlip) -> SignedAmount {
        compute_delta(
            outcome,
            &slip.numbers,
            &slip.outside,
            self.straight_unit,
            self.outside_unit,
        )
    }

    /// Sum of all stakes on the slip, `None` on overflow
    pub fn total_stake(&self, slip: &BetSlip) -> Option<Amount> {
        let numbers = self.straight_unit.checked_mul(slip.numbers.len() as Amount)?;
        let outside = self.outside_unit.checked_mul(slip.outside.len() as Amount)?;
        numbers.checked_add(outside)
    }

    /// Conservative worst case the house could owe: every wager winning at once.
    pub fn max_payout(&self, slip: &BetSlip) -> Option<Amount> {
        let straight_win = self
            .straight_unit
            .checked_mul(payout_multiplier(1) as Amount)?
            .checked_mul(slip.numbers.len() as Amount)?;

        slip.outside.iter().try_fold(straight_win, |acc, bet| {
            let odds = payout_multiplier(bet.members().len()) as Amount;
            acc.checked_add(self.outside_unit.checked_mul(odds)?)
        })
    }
}
