use crate::errors::WagerError;
use crate::games::wheel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of pockets on the wheel (0 through 36)
pub const POCKETS: u8 = 37;

/// Stable account identifier (wallet address or session id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque handle correlating an outcome request with its delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 256-bit random value delivered by a provider (big-endian)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RandomWord(#[serde(with = "hex_word")] pub [u8; 32]);

impl RandomWord {
    /// Exact `self mod modulus` over the full 256-bit value.
    pub fn reduce(&self, modulus: u32) -> u32 {
        let modulus = modulus as u64;
        self.0
            .iter()
            .fold(0u64, |acc, byte| (acc * 256 + *byte as u64) % modulus) as u32
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<u64> for RandomWord {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }
}

mod hex_word {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("random word must be 32 bytes"))
    }
}

/// Settled pocket, always in `[0, 36]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Outcome(u8);

impl Outcome {
    pub fn from_random_word(word: &RandomWord) -> Self {
        Self(word.reduce(POCKETS as u32) as u8)
    }

    pub fn number(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Outcome {
    type Error = WagerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < POCKETS {
            Ok(Self(value))
        } else {
            Err(WagerError::InvalidNumber(value))
        }
    }
}

impl From<Outcome> for u8 {
    fn from(outcome: Outcome) -> Self {
        outcome.0
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Straight-up wager on a single pocket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct NumberBet(u8);

impl NumberBet {
    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn wins(&self, outcome: Outcome) -> bool {
        self.0 == outcome.number()
    }
}

impl TryFrom<u8> for NumberBet {
    type Error = WagerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < POCKETS {
            Ok(Self(value))
        } else {
            Err(WagerError::InvalidNumber(value))
        }
    }
}

impl From<NumberBet> for u8 {
    fn from(bet: NumberBet) -> Self {
        bet.0
    }
}

/// Wager on a named group of pockets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutsideBet {
    #[serde(rename = "ODD")]
    Odd,
    #[serde(rename = "EVEN")]
    Even,
    #[serde(rename = "RED")]
    Red,
    #[serde(rename = "BLACK")]
    Black,
    #[serde(rename = "ONE_TO_EIGHTEEN")]
    OneToEighteen,
    #[serde(rename = "NINETEEN_TO_THIRTYSIX")]
    NineteenToThirtySix,
    #[serde(rename = "ONE_TO_TWELVE")]
    OneToTwelve,
    #[serde(rename = "THIRTEEN_TO_TWENTYFOUR")]
    ThirteenToTwentyFour,
    #[serde(rename = "TWENTYFIVE_TO_THIRTYSIX")]
    TwentyFiveToThirtySix,
    #[serde(rename = "FIRST_COLOUMN", alias = "FIRST_COLUMN")]
    FirstColumn,
    #[serde(rename = "SECOND_COLOUMN", alias = "SECOND_COLUMN")]
    SecondColumn,
    #[serde(rename = "THIRD_COLOUMN", alias = "THIRD_COLUMN")]
    ThirdColumn,
}

impl OutsideBet {
    pub const ALL: [OutsideBet; 12] = [
        OutsideBet::Odd,
        OutsideBet::Even,
        OutsideBet::Red,
        OutsideBet::Black,
        OutsideBet::OneToEighteen,
        OutsideBet::NineteenToThirtySix,
        OutsideBet::OneToTwelve,
        OutsideBet::ThirteenToTwentyFour,
        OutsideBet::TwentyFiveToThirtySix,
        OutsideBet::FirstColumn,
        OutsideBet::SecondColumn,
        OutsideBet::ThirdColumn,
    ];

    /// Pockets covered by this category
    pub fn members(&self) -> &'static [u8] {
        match self {
            OutsideBet::Odd => &wheel::ODD,
            OutsideBet::Even => &wheel::EVEN,
            OutsideBet::Red => &wheel::RED,
            OutsideBet::Black => &wheel::BLACK,
            OutsideBet::OneToEighteen => &wheel::LOW,
            OutsideBet::NineteenToThirtySix => &wheel::HIGH,
            OutsideBet::OneToTwelve => &wheel::FIRST_DOZEN,
            OutsideBet::ThirteenToTwentyFour => &wheel::SECOND_DOZEN,
            OutsideBet::TwentyFiveToThirtySix => &wheel::THIRD_DOZEN,
            OutsideBet::FirstColumn => &wheel::FIRST_COLUMN,
            OutsideBet::SecondColumn => &wheel::SECOND_COLUMN,
            OutsideBet::ThirdColumn => &wheel::THIRD_COLUMN,
        }
    }

    pub fn wins(&self, outcome: Outcome) -> bool {
        self.members().contains(&outcome.number())
    }

    /// Wire name used by clients and logs
    pub fn name(&self) -> &'static str {
        match self {
            OutsideBet::Odd => "ODD",
            OutsideBet::Even => "EVEN",
            OutsideBet::Red => "RED",
            OutsideBet::Black => "BLACK",
            OutsideBet::OneToEighteen => "ONE_TO_EIGHTEEN",
            OutsideBet::NineteenToThirtySix => "NINETEEN_TO_THIRTYSIX",
            OutsideBet::OneToTwelve => "ONE_TO_TWELVE",
            OutsideBet::ThirteenToTwentyFour => "THIRTEEN_TO_TWENTYFOUR",
            OutsideBet::TwentyFiveToThirtySix => "TWENTYFIVE_TO_THIRTYSIX",
            OutsideBet::FirstColumn => "FIRST_COLOUMN",
            OutsideBet::SecondColumn => "SECOND_COLOUMN",
            OutsideBet::ThirdColumn => "THIRD_COLOUMN",
        }
    }
}

impl fmt::Display for OutsideBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutsideBet {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace("_COLUMN", "_COLOUMN");
        OutsideBet::ALL
            .into_iter()
            .find(|bet| bet.name() == normalized)
            .ok_or_else(|| WagerError::UnknownCategory(s.to_string()))
    }
}

/// Complete set of wagers submitted with one outcome request.
///
/// Immutable once registered; the engine only ever clones it into events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetSlip {
    pub numbers: Vec<NumberBet>,
    pub outside: Vec<OutsideBet>,
}

impl BetSlip {
    /// Validate raw pocket numbers and category names into a slip.
    pub fn new<N, O>(numbers: N, outside: O) -> Result<Self, WagerError>
    where
        N: IntoIterator<Item = u8>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        let numbers = numbers
            .into_iter()
            .map(NumberBet::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let outside = outside
            .into_iter()
            .map(|name| name.as_ref().parse::<OutsideBet>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { numbers, outside })
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.outside.is_empty()
    }
}
