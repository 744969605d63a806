use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::Timestamp;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

impl Event {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Execution log of one message of a transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxLog {
    pub msg_index: usize,
    pub events: Vec<Event>,
}

impl TxLog {
    pub fn attribute(&self, event_type: &str, key: &str) -> Option<&str> {
        self.events
            .iter()
            .filter(|e| e.kind == event_type)
            .find_map(|e| e.attribute(key))
    }

    /// Splits a flat event list into per-message logs using the `msg_index` attribute
    /// newer nodes attach to every message event. Events without one belong to the
    /// transaction as a whole and are dropped.
    pub fn group(events: Vec<Event>) -> Vec<TxLog> {
        events
            .into_iter()
            .filter_map(|e| {
                let index = e.attribute("msg_index")?.parse::<usize>().ok()?;
                Some((index, e))
            })
            .into_group_map()
            .into_iter()
            .sorted_by_key(|(index, _)| *index)
            .map(|(msg_index, events)| TxLog { msg_index, events })
            .collect()
    }
}

/// A decoded message of a settled transaction, reduced to what the ledger cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContractMessage {
    Instantiate {
        sender: String,
        admin: Option<String>,
        code_id: u64,
        label: String,
    },
    Execute {
        sender: String,
        contract: String,
        msg: Vec<u8>,
    },
    Migrate {
        sender: String,
        contract: String,
        code_id: u64,
    },
    /// Any non-wasm message, by type url.
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettledTransaction {
    pub hash: String,
    pub height: u64,
    pub success: bool,
    pub messages: Vec<ContractMessage>,
    pub logs: Vec<TxLog>,
}

impl SettledTransaction {
    pub fn has_logs(&self) -> bool {
        self.logs.iter().any(|l| !l.events.is_empty())
    }

    pub fn log(&self, msg_index: usize) -> Option<&TxLog> {
        self.logs.iter().find(|l| l.msg_index == msg_index)
    }

    /// Address of the contract created by the instantiate message at `msg_index`.
    pub fn instantiated_address(&self, msg_index: usize) -> Option<&str> {
        self.log(msg_index)?
            .attribute("instantiate", "_contract_address")
    }
}

/// A block and its settled transactions, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub height: u64,
    pub time: Timestamp,
    pub hash: String,
    pub transactions: Vec<SettledTransaction>,
}
