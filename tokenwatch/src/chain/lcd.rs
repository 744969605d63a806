use std::time::Duration;

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE},
    Engine,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use serde_with::{serde_as, DisplayFromStr};
use tokenwatch_core::{
    Amount, Block, ContractMessage, Event, Expiration, SettledTransaction, StateEntry, Timestamp,
    TokenInfo, TxLog,
};

use super::{BlockSource, ChainError, ChainQuery};

const HEIGHT_HEADER: &str = "x-cosmos-block-height";

const MSG_INSTANTIATE: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
const MSG_INSTANTIATE2: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract2";
const MSG_EXECUTE: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";
const MSG_MIGRATE: &str = "/cosmwasm.wasm.v1.MsgMigrateContract";

/// Client for a Cosmos SDK node's REST (LCD) gateway.
#[derive(Clone, Debug)]
pub struct LcdClient {
    client: Client,
    base: String,
    page_limit: u32,
}

#[derive(Deserialize)]
struct SmartResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct StateModel {
    key: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct Pagination {
    #[serde(default)]
    next_key: Option<String>,
    #[serde(default)]
    total: Option<String>,
}

#[derive(Deserialize)]
struct StateResponse {
    #[serde(default)]
    models: Vec<StateModel>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: Amount,
}

#[derive(Deserialize)]
struct AllowanceResponse {
    allowance: Amount,
    #[serde(default)]
    expires: Expiration,
}

#[serde_as]
#[derive(Deserialize)]
struct Header {
    #[serde_as(as = "DisplayFromStr")]
    height: u64,
    time: String,
}

#[derive(Deserialize)]
struct HeaderBlock {
    header: Header,
}

#[derive(Deserialize, Default)]
struct BlockId {
    #[serde(default)]
    hash: String,
}

#[derive(Deserialize)]
struct BlockResponse {
    #[serde(default)]
    block_id: BlockId,
    block: HeaderBlock,
}

#[derive(Deserialize)]
struct AbciLog {
    #[serde(default)]
    msg_index: usize,
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Deserialize)]
struct TxBody {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Deserialize)]
struct TxEnvelope {
    body: TxBody,
}

#[serde_as]
#[derive(Deserialize)]
struct TxResponse {
    #[serde_as(as = "DisplayFromStr")]
    height: u64,
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    logs: Vec<AbciLog>,
    #[serde(default)]
    events: Vec<Event>,
    tx: TxEnvelope,
}

#[derive(Deserialize)]
struct TxsResponse {
    #[serde(default)]
    tx_responses: Vec<TxResponse>,
    #[serde(default)]
    pagination: Option<Pagination>,
    /// Newer nodes report the count here and send `pagination: null`.
    #[serde(default)]
    total: Option<String>,
}

impl TxsResponse {
    fn total(&self) -> Option<usize> {
        self.total
            .as_deref()
            .or_else(|| self.pagination.as_ref().and_then(|p| p.total.as_deref()))
            .and_then(|t| t.parse().ok())
    }
}

#[serde_as]
#[derive(Deserialize)]
struct InstantiateBody {
    sender: String,
    #[serde(default)]
    admin: String,
    #[serde_as(as = "DisplayFromStr")]
    code_id: u64,
    #[serde(default)]
    label: String,
}

#[derive(Deserialize)]
struct ExecuteBody {
    sender: String,
    contract: String,
    msg: Value,
}

#[serde_as]
#[derive(Deserialize)]
struct MigrateBody {
    sender: String,
    contract: String,
    #[serde_as(as = "DisplayFromStr")]
    code_id: u64,
}

impl LcdClient {
    pub fn new(base: &str, timeout: Duration, page_limit: u32) -> anyhow::Result<LcdClient> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(LcdClient {
            client,
            base: base.trim_end_matches('/').to_owned(),
            page_limit,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        height: Option<u64>,
    ) -> Result<T, ChainError> {
        let mut request = self.client.get(format!("{}{path}", self.base)).query(query);
        if let Some(height) = height {
            request = request.header(HEIGHT_HEADER, height.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChainError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn smart<T: DeserializeOwned>(
        &self,
        address: &str,
        query: &Value,
        height: u64,
    ) -> Result<T, ChainError> {
        let encoded = URL_SAFE.encode(serde_json::to_vec(query)?);
        let response: SmartResponse<T> = self
            .get(
                &format!("/cosmwasm/wasm/v1/contract/{address}/smart/{encoded}"),
                &[],
                Some(height),
            )
            .await?;
        Ok(response.data)
    }

    async fn transactions(&self, height: u64) -> Result<Vec<SettledTransaction>, ChainError> {
        let filter = format!("tx.height={height}");
        let limit = self.page_limit.max(1) as usize;
        let mut transactions = Vec::new();
        loop {
            let page = transactions.len() / limit + 1;
            // `events` for SDK 0.47 and older, `query` with `page` from 0.50 on.
            let response: TxsResponse = self
                .get(
                    "/cosmos/tx/v1beta1/txs",
                    &[
                        ("events", filter.clone()),
                        ("query", filter.clone()),
                        ("page", page.to_string()),
                        ("limit", limit.to_string()),
                        ("pagination.limit", limit.to_string()),
                        ("pagination.offset", transactions.len().to_string()),
                        ("order_by", "ORDER_BY_ASC".to_owned()),
                    ],
                    None,
                )
                .await?;

            let total = response.total();
            let fetched = response.tx_responses.len();
            for tx in response.tx_responses {
                transactions.push(settled(tx)?);
            }

            if fetched < limit || total.is_some_and(|t| transactions.len() >= t) {
                break;
            }
        }
        Ok(transactions)
    }
}

fn settled(tx: TxResponse) -> Result<SettledTransaction, ChainError> {
    let messages = tx
        .tx
        .body
        .messages
        .into_iter()
        .map(contract_message)
        .collect::<Result<Vec<_>, _>>()?;

    // Nodes from SDK 0.50 on leave `logs` empty and tag each event with its msg_index.
    let logs = if tx.logs.is_empty() {
        TxLog::group(tx.events)
    } else {
        tx.logs
            .into_iter()
            .map(|l| TxLog {
                msg_index: l.msg_index,
                events: l.events,
            })
            .collect()
    };

    Ok(SettledTransaction {
        hash: tx.txhash,
        height: tx.height,
        success: tx.code == 0,
        messages,
        logs,
    })
}

fn contract_message(msg: Value) -> Result<ContractMessage, ChainError> {
    let type_url = msg
        .get("@type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let msg = match type_url.as_str() {
        MSG_INSTANTIATE | MSG_INSTANTIATE2 => {
            let body: InstantiateBody = serde_json::from_value(msg)?;
            ContractMessage::Instantiate {
                sender: body.sender,
                admin: Some(body.admin).filter(|a| !a.is_empty()),
                code_id: body.code_id,
                label: body.label,
            }
        }
        MSG_EXECUTE => {
            let body: ExecuteBody = serde_json::from_value(msg)?;
            ContractMessage::Execute {
                sender: body.sender,
                contract: body.contract,
                msg: serde_json::to_vec(&body.msg)?,
            }
        }
        MSG_MIGRATE => {
            let body: MigrateBody = serde_json::from_value(msg)?;
            ContractMessage::Migrate {
                sender: body.sender,
                contract: body.contract,
                code_id: body.code_id,
            }
        }
        _ => ContractMessage::Other(type_url),
    };
    Ok(msg)
}

#[async_trait]
impl ChainQuery for LcdClient {
    async fn full_state(&self, address: &str, height: u64) -> Result<Vec<StateEntry>, ChainError> {
        let mut entries = Vec::new();
        let mut next_key: Option<String> = None;
        loop {
            let mut query = vec![("pagination.limit", self.page_limit.to_string())];
            if let Some(key) = &next_key {
                query.push(("pagination.key", key.clone()));
            }
            let response: StateResponse = self
                .get(
                    &format!("/cosmwasm/wasm/v1/contract/{address}/state"),
                    &query,
                    Some(height),
                )
                .await?;

            for model in response.models {
                let key = hex::decode(&model.key)
                    .map_err(|e| ChainError::Decode(format!("state key {}: {e}", model.key)))?;
                entries.push(StateEntry::new(key, BASE64.decode(&model.value)?));
            }

            next_key = response
                .pagination
                .and_then(|p| p.next_key)
                .filter(|k| !k.is_empty());
            if next_key.is_none() {
                break;
            }
        }
        tracing::debug!("Fetched {} state entries of {address} at {height}", entries.len());
        Ok(entries)
    }

    async fn balance(&self, address: &str, holder: &str, height: u64) -> Result<Amount, ChainError> {
        let response: BalanceResponse = self
            .smart(address, &json!({"balance": {"address": holder}}), height)
            .await?;
        Ok(response.balance)
    }

    async fn circulating_supply(&self, address: &str, height: u64) -> Result<Amount, ChainError> {
        let info: TokenInfo = self
            .smart(address, &json!({"token_info": {}}), height)
            .await?;
        Ok(info.total_supply)
    }

    async fn allowance(
        &self,
        address: &str,
        owner: &str,
        spender: &str,
        height: u64,
    ) -> Result<(Amount, Expiration), ChainError> {
        let response: AllowanceResponse = self
            .smart(
                address,
                &json!({"allowance": {"owner": owner, "spender": spender}}),
                height,
            )
            .await?;
        Ok((response.allowance, response.expires))
    }

    async fn latest_height(&self) -> Result<u64, ChainError> {
        let response: BlockResponse = self
            .get("/cosmos/base/tendermint/v1beta1/blocks/latest", &[], None)
            .await?;
        Ok(response.block.header.height)
    }
}

#[async_trait]
impl BlockSource for LcdClient {
    async fn block(&self, height: u64) -> Result<Block, ChainError> {
        let response: BlockResponse = self
            .get(&format!("/cosmos/base/tendermint/v1beta1/blocks/{height}"), &[], None)
            .await?;
        let time = Timestamp::parse_rfc3339(&response.block.header.time)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        let hash = hex::encode_upper(BASE64.decode(&response.block_id.hash)?);

        Ok(Block {
            height: response.block.header.height,
            time,
            hash,
            transactions: self.transactions(height).await?,
        })
    }
}
