//! Read access to the CosmWasm execution layer.

mod lcd;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use tokenwatch_core::{Amount, Block, Expiration, StateEntry};

pub use lcd::LcdClient;

#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    #[error("chain request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chain node answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("undecodable chain response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for ChainError {
    fn from(err: base64::DecodeError) -> Self {
        ChainError::Decode(err.to_string())
    }
}

/// Contract state queries, always answered as of a given block height.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Every raw key/value pair stored by the contract.
    async fn full_state(&self, address: &str, height: u64) -> Result<Vec<StateEntry>, ChainError>;

    async fn balance(&self, address: &str, holder: &str, height: u64) -> Result<Amount, ChainError>;

    async fn circulating_supply(&self, address: &str, height: u64) -> Result<Amount, ChainError>;

    async fn allowance(
        &self,
        address: &str,
        owner: &str,
        spender: &str,
        height: u64,
    ) -> Result<(Amount, Expiration), ChainError>;

    async fn latest_height(&self) -> Result<u64, ChainError>;
}

/// Settled blocks with their transactions, in execution order.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn block(&self, height: u64) -> Result<Block, ChainError>;
}
