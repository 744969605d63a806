use serde::{Deserialize, Serialize};

use crate::{Amount, Expiration};

/// The `token_info` item of a CW20 contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    #[serde(default)]
    pub mint: Option<MinterData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinterData {
    pub minter: String,
    #[serde(default)]
    pub cap: Option<Amount>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marketing {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Address allowed to update marketing fields.
    #[serde(default)]
    pub marketing: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Balance {
    pub holder: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allowance {
    pub owner: String,
    pub spender: String,
    pub amount: Amount,
    pub expires: Expiration,
}

/// A CW20 contract whose code id is verified, with everything the ledger keeps about it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedToken {
    pub address: String,
    pub code_id: u64,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: Amount,
    pub minter: Option<String>,
    pub cap: Option<Amount>,
    pub marketing: Marketing,
    pub logo: Option<String>,
    pub balances: Vec<Balance>,
    pub allowances: Vec<Allowance>,
}
