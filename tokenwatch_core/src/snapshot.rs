//! Decoding of a CW20 contract's raw storage into a [`TrackedToken`].
//!
//! cw20-base keeps its state under a handful of `cw-storage-plus` namespaces. Items are
//! stored under the bare namespace; map entries are stored under the namespace prefixed
//! with its big-endian `u16` length, followed by the key. Composite keys length-prefix
//! every element but the last.

use serde::Deserialize;

use crate::{Allowance, Amount, Balance, Expiration, Marketing, TokenInfo, TrackedToken};

const TOKEN_INFO: &[u8] = b"token_info";
const MARKETING_INFO: &[u8] = b"marketing_info";
const LOGO: &[u8] = b"logo";
const BALANCES: &[u8] = b"balance";
const ALLOWANCES: &[u8] = b"allowance";

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("contract state has no token_info")]
    MissingTokenInfo,
    #[error("undecodable value under key {key}: {source}")]
    Value {
        key: String,
        source: serde_json::Error,
    },
    #[error("undecodable storage key {0}")]
    Key(String),
}

/// One raw key/value pair of a contract's storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl StateEntry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> StateEntry {
        StateEntry {
            key: key.into(),
            value: value.into(),
        }
    }

    fn decode<'a, T: Deserialize<'a>>(&'a self) -> Result<T, SnapshotError> {
        serde_json::from_slice(&self.value).map_err(|source| SnapshotError::Value {
            key: String::from_utf8_lossy(&self.key).into_owned(),
            source,
        })
    }
}

/// Storage key of a map entry, as cw-storage-plus lays it out.
pub fn map_key(namespace: &[u8], parts: &[&[u8]]) -> Vec<u8> {
    let mut key = Vec::new();
    push_prefixed(&mut key, namespace);
    if let Some((last, init)) = parts.split_last() {
        for part in init {
            push_prefixed(&mut key, part);
        }
        key.extend_from_slice(last);
    }
    key
}

fn push_prefixed(key: &mut Vec<u8>, part: &[u8]) {
    let len = u16::try_from(part.len()).unwrap_or(u16::MAX);
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(part);
}

/// Strips a length-prefixed namespace from a map key, returning the remainder.
fn strip_namespace<'a>(key: &'a [u8], namespace: &[u8]) -> Option<&'a [u8]> {
    let (len, rest) = split_prefixed(key)?;
    (len == namespace).then_some(rest)
}

fn split_prefixed(key: &[u8]) -> Option<(&[u8], &[u8])> {
    if key.len() < 2 {
        return None;
    }
    let len = u16::from_be_bytes([key[0], key[1]]) as usize;
    let rest = &key[2..];
    (rest.len() >= len).then(|| rest.split_at(len))
}

fn address(bytes: &[u8], key: &[u8]) -> Result<String, SnapshotError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| SnapshotError::Key(hex::encode(key)))
}

#[derive(Deserialize)]
struct MarketingInfo {
    #[serde(flatten)]
    marketing: Marketing,
    #[serde(default)]
    logo: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AllowanceValue {
    allowance: Amount,
    #[serde(default)]
    expires: Expiration,
}

/// Token state decoded from a full storage dump.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSnapshot {
    pub info: TokenInfo,
    pub marketing: Marketing,
    pub logo: Option<String>,
    pub balances: Vec<Balance>,
    pub allowances: Vec<Allowance>,
}

impl TokenSnapshot {
    pub fn from_entries(entries: &[StateEntry]) -> Result<TokenSnapshot, SnapshotError> {
        let mut info = None;
        let mut marketing = Marketing::default();
        let mut logo = None;
        let mut logo_info = None;
        let mut balances = Vec::new();
        let mut allowances = Vec::new();

        for entry in entries {
            let key = entry.key.as_slice();
            if key == TOKEN_INFO {
                info = Some(entry.decode::<TokenInfo>()?);
            } else if key == MARKETING_INFO {
                let mi = entry.decode::<MarketingInfo>()?;
                marketing = mi.marketing;
                logo_info = mi.logo.map(|l| l.to_string());
            } else if key == LOGO {
                logo = Some(String::from_utf8_lossy(&entry.value).into_owned());
            } else if let Some(holder) = strip_namespace(key, BALANCES) {
                let amount = entry.decode::<Amount>()?;
                if !amount.is_zero() {
                    balances.push(Balance {
                        holder: address(holder, key)?,
                        amount,
                    });
                }
            } else if let Some(rest) = strip_namespace(key, ALLOWANCES) {
                let (owner, spender) =
                    split_prefixed(rest).ok_or_else(|| SnapshotError::Key(hex::encode(key)))?;
                let value = entry.decode::<AllowanceValue>()?;
                allowances.push(Allowance {
                    owner: address(owner, key)?,
                    spender: address(spender, key)?,
                    amount: value.allowance,
                    expires: value.expires,
                });
            }
        }

        Ok(TokenSnapshot {
            info: info.ok_or(SnapshotError::MissingTokenInfo)?,
            marketing,
            logo: logo.or(logo_info),
            balances,
            allowances,
        })
    }

    pub fn into_token(self, address: &str, code_id: u64) -> TrackedToken {
        let (minter, cap) = match self.info.mint {
            Some(mint) => (Some(mint.minter), mint.cap),
            None => (None, None),
        };
        TrackedToken {
            address: address.to_owned(),
            code_id,
            name: self.info.name,
            symbol: self.info.symbol,
            decimals: self.info.decimals,
            total_supply: self.info.total_supply,
            minter,
            cap,
            marketing: self.marketing,
            logo: self.logo,
            balances: self.balances,
            allowances: self.allowances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<StateEntry> {
        vec![
            StateEntry::new(b"contract_info".to_vec(), br#"{"contract":"crates.io:cw20-base","version":"1.1.0"}"#.to_vec()),
            StateEntry::new(
                TOKEN_INFO,
                br#"{"name":"Moon","symbol":"MOON","decimals":6,"total_supply":"40","mint":{"minter":"wasm1minter","cap":"1000"}}"#.to_vec(),
            ),
            StateEntry::new(
                MARKETING_INFO,
                br#"{"project":"https://moon.example","description":"to the moon","marketing":"wasm1admin","logo":"embedded"}"#.to_vec(),
            ),
            StateEntry::new(map_key(BALANCES, &[b"wasm1alice"]), br#""20""#.to_vec()),
            StateEntry::new(map_key(BALANCES, &[b"wasm1bob"]), br#""20""#.to_vec()),
            StateEntry::new(map_key(BALANCES, &[b"wasm1carol"]), br#""0""#.to_vec()),
            StateEntry::new(
                map_key(ALLOWANCES, &[b"wasm1alice", b"wasm1bob"]),
                br#"{"allowance":"5","expires":{"at_height":10}}"#.to_vec(),
            ),
            StateEntry::new(
                map_key(b"allowance_spender", &[b"wasm1bob", b"wasm1alice"]),
                br#"{"allowance":"5","expires":{"at_height":10}}"#.to_vec(),
            ),
        ]
    }

    #[test]
    fn test_snapshot_decodes_cw20_base_layout() {
        let snapshot = TokenSnapshot::from_entries(&entries()).unwrap();
        assert_eq!(snapshot.info.symbol, "MOON");
        assert_eq!(snapshot.marketing.marketing.as_deref(), Some("wasm1admin"));
        assert_eq!(snapshot.logo.as_deref(), Some(r#""embedded""#));
        assert_eq!(
            snapshot.balances,
            vec![
                Balance {
                    holder: "wasm1alice".into(),
                    amount: 20.into()
                },
                Balance {
                    holder: "wasm1bob".into(),
                    amount: 20.into()
                },
            ]
        );
        assert_eq!(
            snapshot.allowances,
            vec![Allowance {
                owner: "wasm1alice".into(),
                spender: "wasm1bob".into(),
                amount: 5.into(),
                expires: Expiration::AtHeight(10),
            }]
        );

        let token = snapshot.into_token("wasm1moon", 7);
        assert_eq!(token.code_id, 7);
        assert_eq!(token.minter.as_deref(), Some("wasm1minter"));
        assert_eq!(token.cap, Some(1000.into()));
    }

    #[test]
    fn test_logo_item_wins_over_marketing_logo() {
        let mut entries = entries();
        entries.push(StateEntry::new(LOGO, br#"{"url":"https://moon.example/logo.png"}"#.to_vec()));
        let snapshot = TokenSnapshot::from_entries(&entries).unwrap();
        assert_eq!(
            snapshot.logo.as_deref(),
            Some(r#"{"url":"https://moon.example/logo.png"}"#)
        );
    }

    #[test]
    fn test_missing_token_info() {
        let entries = vec![StateEntry::new(map_key(BALANCES, &[b"wasm1alice"]), br#""1""#.to_vec())];
        assert!(matches!(
            TokenSnapshot::from_entries(&entries),
            Err(SnapshotError::MissingTokenInfo)
        ));
    }

    #[test]
    fn test_bad_balance_value() {
        let mut entries = entries();
        entries.push(StateEntry::new(map_key(BALANCES, &[b"wasm1dave"]), b"12".to_vec()));
        assert!(matches!(
            TokenSnapshot::from_entries(&entries),
            Err(SnapshotError::Value { .. })
        ));
    }

    #[test]
    fn test_truncated_allowance_key() {
        let mut entries = entries();
        entries.push(StateEntry::new(
            map_key(ALLOWANCES, &[b"\xff"]),
            br#"{"allowance":"1"}"#.to_vec(),
        ));
        let Err(SnapshotError::Key(key)) = TokenSnapshot::from_entries(&entries) else {
            panic!("expected undecodable key");
        };
        assert_eq!(key, "0009616c6c6f77616e6365ff");
    }
}
