//! Fixed-point currency amounts
//!
//! Every balance in the engine is an integer count of the smallest currency
//! unit (18 decimals). Decimal strings such as `"0.0005"` only appear at the
//! edges: configuration files, logs and the operator binary.

use crate::errors::ConfigurationError;

/// Unsigned amount in the smallest currency unit
pub type Amount = u128;

/// Signed amount, used for settlement deltas
pub type SignedAmount = i128;

/// Number of fractional digits in one whole currency unit
pub const DECIMALS: u32 = 18;

/// One whole currency unit expressed in the smallest unit
pub const ONE: Amount = 1_000_000_000_000_000_000;

/// Parse a decimal string (`"0.0025"`, `"1"`, `"12.5"`) into base units.
pub fn parse_units(value: &str) -> Result<Amount, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidValue {
        field: "amount".to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty amount"));
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("only unsigned decimal digits are allowed"));
    }
    if fraction.len() > DECIMALS as usize {
        return Err(invalid("more than 18 fractional digits"));
    }

    let whole_units: Amount = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid("integer part overflows"))?
    };

    let mut padded = fraction.to_string();
    padded.extend(std::iter::repeat('0').take(DECIMALS as usize - fraction.len()));
    let fraction_units: Amount = padded.parse().map_err(|_| invalid("fraction overflows"))?;

    whole_units
        .checked_mul(ONE)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or_else(|| invalid("amount overflows"))
}

/// Render base units as a trimmed decimal string.
pub fn format_units(amount: Amount) -> String {
    let whole = amount / ONE;
    let fraction = amount % ONE;
    if fraction == 0 {
        return whole.to_string();
    }

    let digits = format!("{:018}", fraction);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Render a signed delta, keeping the sign for losses.
pub fn format_signed(delta: SignedAmount) -> String {
    let magnitude = format_units(delta.unsigned_abs());
    if delta < 0 {
        format!("-{}", magnitude)
    } else {
        magnitude
    }
}

/// Serde adapter storing amounts as decimal strings in config files.
///
/// TOML integers are 64-bit, which cannot hold a realistic reserve in base
/// units, so amounts travel as text.
pub mod serde_amount {
    use super::{format_units, parse_units, Amount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_units(*amount))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_units(&raw).map_err(serde::de::Error::custom)
    }
}

/// Signed counterpart of [`serde_amount`], used for deltas in events
pub mod serde_signed_amount {
    use super::{format_signed, parse_units, SignedAmount};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &SignedAmount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_signed(*delta))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SignedAmount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let (negative, digits) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw.as_str()),
        };
        let magnitude = parse_units(digits).map_err(serde::de::Error::custom)?;
        let magnitude = SignedAmount::try_from(magnitude).map_err(serde::de::Error::custom)?;
        Ok(if negative { -magnitude } else { magnitude })
    }
}
