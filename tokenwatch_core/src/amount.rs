use std::{fmt::Display, num::ParseIntError, str::FromStr};

use derive_more::{Deref, From, Into};

#[derive(thiserror::Error, Debug)]
#[error("invalid amount: {0}")]
pub struct AmountError(#[from] ParseIntError);

/// Token quantity as it appears on the wire: a decimal string wrapping a `u128`.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deref,
    From,
    Into,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Amount(s.parse()?))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
