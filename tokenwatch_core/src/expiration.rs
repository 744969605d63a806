use std::{fmt::Display, num::ParseIntError, str::FromStr};

use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(thiserror::Error, Debug)]
pub enum TimestampError {
    #[error("invalid timestamp: {0}")]
    Nanos(#[from] ParseIntError),
    #[error("invalid block time: {0}")]
    Rfc3339(#[from] time::error::Parse),
    #[error("block time before unix epoch")]
    BeforeEpoch,
}

/// Nanoseconds since the unix epoch, serialized as a decimal string.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Deref,
    From,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_nanos(nanos: u64) -> Timestamp {
        Timestamp(nanos)
    }

    pub fn nanos(self) -> u64 {
        self.0
    }

    pub fn parse_rfc3339(s: &str) -> Result<Timestamp, TimestampError> {
        let nanos = OffsetDateTime::parse(s, &Rfc3339)?.unix_timestamp_nanos();
        let nanos = u64::try_from(nanos).map_err(|_| TimestampError::BeforeEpoch)?;
        Ok(Timestamp(nanos))
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Timestamp(s.parse()?))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Height and time of a block the indexer has seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    pub time: Timestamp,
}

/// When an allowance stops being spendable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expiration {
    AtHeight(u64),
    AtTime(Timestamp),
    Never {},
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never {}
    }
}

impl Expiration {
    pub fn is_expired(&self, block: &BlockInfo) -> bool {
        match self {
            Expiration::AtHeight(height) => block.height >= *height,
            Expiration::AtTime(time) => block.time >= *time,
            Expiration::Never {} => false,
        }
    }

    pub fn height(&self) -> Option<u64> {
        match self {
            Expiration::AtHeight(height) => Some(*height),
            _ => None,
        }
    }

    pub fn time(&self) -> Option<Timestamp> {
        match self {
            Expiration::AtTime(time) => Some(*time),
            _ => None,
        }
    }

    /// Rebuilds an expiration from its two mutually exclusive columns. Height wins if a
    /// row somehow carries both.
    pub fn from_parts(height: Option<u64>, time: Option<Timestamp>) -> Expiration {
        match (height, time) {
            (Some(height), _) => Expiration::AtHeight(height),
            (None, Some(time)) => Expiration::AtTime(time),
            (None, None) => Expiration::Never {},
        }
    }
}
