use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::value::RawValue;

use crate::{Amount, Expiration, Marketing};

#[derive(thiserror::Error, Debug)]
pub enum MessageError {
    #[error("execute payload is not a JSON object: {0}")]
    Json(#[from] serde_json::Error),
    #[error("execute payload must have exactly one operation, found {0:?}")]
    OperationCount(Vec<String>),
    #[error("invalid body for {operation}: {source}")]
    Body {
        operation: String,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Transfer {
    pub recipient: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TransferFrom {
    pub owner: String,
    pub recipient: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SendToContract {
    pub contract: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SendFrom {
    pub owner: String,
    pub contract: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Mint {
    pub recipient: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Burn {
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BurnFrom {
    pub owner: String,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AllowanceChange {
    pub spender: String,
    pub amount: Amount,
    #[serde(default)]
    pub expires: Option<Expiration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UpdateMinter {
    #[serde(default)]
    pub new_minter: Option<String>,
}

/// Marketing fields of an `update_marketing` call. A missing field is left alone, an
/// empty string clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateMarketing {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub marketing: Option<String>,
}

impl UpdateMarketing {
    pub fn apply(&self, current: &mut Marketing) {
        fn set(field: &mut Option<String>, update: &Option<String>) {
            match update.as_deref() {
                None => {}
                Some("") => *field = None,
                Some(value) => *field = Some(value.to_owned()),
            }
        }
        set(&mut current.project, &self.project);
        set(&mut current.description, &self.description);
        set(&mut current.marketing, &self.marketing);
    }
}

/// A CW20 execute message, decoded from its single-key JSON envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecuteMsg {
    Transfer(Transfer),
    TransferFrom(TransferFrom),
    Send(SendToContract),
    SendFrom(SendFrom),
    Mint(Mint),
    Burn(Burn),
    BurnFrom(BurnFrom),
    IncreaseAllowance(AllowanceChange),
    DecreaseAllowance(AllowanceChange),
    UpdateMinter(UpdateMinter),
    UpdateMarketing(UpdateMarketing),
    /// Raw JSON body of the logo, with invalid UTF-8 removed.
    UploadLogo(String),
    /// Any operation the ledger does not follow.
    Other(String),
}

impl ExecuteMsg {
    pub fn decode(payload: &[u8]) -> Result<ExecuteMsg, MessageError> {
        let payload = sanitize_utf8(payload);
        let operations: BTreeMap<String, &RawValue> = serde_json::from_str(&payload)?;
        if operations.len() != 1 {
            return Err(MessageError::OperationCount(
                operations.into_keys().collect(),
            ));
        }
        let Some((operation, raw)) = operations.into_iter().next() else {
            return Err(MessageError::OperationCount(Vec::new()));
        };

        let msg = match operation.as_str() {
            "transfer" => ExecuteMsg::Transfer(body(&operation, raw)?),
            "transfer_from" => ExecuteMsg::TransferFrom(body(&operation, raw)?),
            "send" => ExecuteMsg::Send(body(&operation, raw)?),
            "send_from" => ExecuteMsg::SendFrom(body(&operation, raw)?),
            "mint" => ExecuteMsg::Mint(body(&operation, raw)?),
            "burn" => ExecuteMsg::Burn(body(&operation, raw)?),
            "burn_from" => ExecuteMsg::BurnFrom(body(&operation, raw)?),
            "increase_allowance" => ExecuteMsg::IncreaseAllowance(body(&operation, raw)?),
            "decrease_allowance" => ExecuteMsg::DecreaseAllowance(body(&operation, raw)?),
            "update_minter" => ExecuteMsg::UpdateMinter(body(&operation, raw)?),
            "update_marketing" => ExecuteMsg::UpdateMarketing(body(&operation, raw)?),
            "upload_logo" => ExecuteMsg::UploadLogo(raw.get().to_owned()),
            _ => ExecuteMsg::Other(operation),
        };
        Ok(msg)
    }

    pub fn operation(&self) -> &str {
        match self {
            ExecuteMsg::Transfer(_) => "transfer",
            ExecuteMsg::TransferFrom(_) => "transfer_from",
            ExecuteMsg::Send(_) => "send",
            ExecuteMsg::SendFrom(_) => "send_from",
            ExecuteMsg::Mint(_) => "mint",
            ExecuteMsg::Burn(_) => "burn",
            ExecuteMsg::BurnFrom(_) => "burn_from",
            ExecuteMsg::IncreaseAllowance(_) => "increase_allowance",
            ExecuteMsg::DecreaseAllowance(_) => "decrease_allowance",
            ExecuteMsg::UpdateMinter(_) => "update_minter",
            ExecuteMsg::UpdateMarketing(_) => "update_marketing",
            ExecuteMsg::UploadLogo(_) => "upload_logo",
            ExecuteMsg::Other(op) => op,
        }
    }

    /// Mint and burn change circulating supply; nothing else does.
    pub fn changes_supply(&self) -> bool {
        matches!(
            self,
            ExecuteMsg::Mint(_) | ExecuteMsg::Burn(_) | ExecuteMsg::BurnFrom(_)
        )
    }

    /// Accounts whose balance the operation may have changed, or `None` if it moves no
    /// tokens. `sender` is the signer of the execute message.
    pub fn balance_holders(&self, sender: &str) -> Option<Vec<String>> {
        let holders: Vec<&str> = match self {
            ExecuteMsg::Transfer(t) => vec![sender, t.recipient.as_str()],
            ExecuteMsg::TransferFrom(t) => vec![t.owner.as_str(), t.recipient.as_str()],
            ExecuteMsg::Send(s) => vec![sender, s.contract.as_str()],
            ExecuteMsg::SendFrom(s) => vec![s.owner.as_str(), s.contract.as_str()],
            ExecuteMsg::Mint(m) => vec![sender, m.recipient.as_str()],
            ExecuteMsg::Burn(_) => vec![sender],
            ExecuteMsg::BurnFrom(b) => vec![b.owner.as_str()],
            _ => return None,
        };
        Some(holders.into_iter().unique().map(str::to_owned).collect())
    }

    /// The `(owner, spender)` allowance the operation may have changed.
    pub fn allowance_key(&self, sender: &str) -> Option<(String, String)> {
        match self {
            ExecuteMsg::IncreaseAllowance(a) | ExecuteMsg::DecreaseAllowance(a) => {
                Some((sender.to_owned(), a.spender.clone()))
            }
            ExecuteMsg::TransferFrom(TransferFrom { owner, .. })
            | ExecuteMsg::SendFrom(SendFrom { owner, .. })
            | ExecuteMsg::BurnFrom(BurnFrom { owner, .. }) => {
                Some((owner.clone(), sender.to_owned()))
            }
            _ => None,
        }
    }
}

fn body<T: DeserializeOwned>(operation: &str, raw: &RawValue) -> Result<T, MessageError> {
    serde_json::from_str(raw.get()).map_err(|source| MessageError::Body {
        operation: operation.to_owned(),
        source,
    })
}

/// Drops every invalid UTF-8 sequence instead of replacing or rejecting it.
pub fn sanitize_utf8(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                match err.error_len() {
                    Some(len) => rest = &after[len..],
                    None => return out,
                }
            }
        }
    }
}
