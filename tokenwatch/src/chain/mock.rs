//! In-memory chain for pipeline tests.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use tokenwatch_core::{map_key, Amount, Block, Expiration, StateEntry, TokenInfo};

use super::{BlockSource, ChainError, ChainQuery};

#[derive(Clone, Debug)]
pub struct MockContract {
    pub info: TokenInfo,
    pub balances: BTreeMap<String, Amount>,
    pub allowances: BTreeMap<(String, String), (Amount, Expiration)>,
    /// Replaces the generated state entirely when set.
    pub raw_state: Option<Vec<StateEntry>>,
}

#[derive(Default)]
struct MockState {
    height: u64,
    contracts: HashMap<String, MockContract>,
    blocks: BTreeMap<u64, Block>,
    unavailable: bool,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
    full_state_calls: AtomicUsize,
    full_state_delay: Mutex<Option<Duration>>,
}

impl MockChain {
    pub fn new(height: u64) -> MockChain {
        let chain = MockChain::default();
        chain.set_height(height);
        chain
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Makes every query fail as if the node were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    pub fn set_full_state_delay(&self, delay: Duration) {
        *self.full_state_delay.lock().unwrap() = Some(delay);
    }

    pub fn full_state_calls(&self) -> usize {
        self.full_state_calls.load(Ordering::SeqCst)
    }

    pub fn add_token(&self, address: &str, symbol: &str, balances: &[(&str, u128)]) {
        let total: u128 = balances.iter().map(|(_, a)| a).sum();
        let contract = MockContract {
            info: TokenInfo {
                name: format!("{symbol} token"),
                symbol: symbol.to_owned(),
                decimals: 6,
                total_supply: total.into(),
                mint: None,
            },
            balances: balances
                .iter()
                .map(|(holder, amount)| ((*holder).to_owned(), (*amount).into()))
                .collect(),
            allowances: BTreeMap::new(),
            raw_state: None,
        };
        self.state
            .lock()
            .unwrap()
            .contracts
            .insert(address.to_owned(), contract);
    }

    /// A contract whose storage is not a CW20 layout.
    pub fn add_raw(&self, address: &str, entries: Vec<StateEntry>) {
        self.add_token(address, "RAW", &[]);
        self.with_contract(address, |c| c.raw_state = Some(entries));
    }

    pub fn with_contract(&self, address: &str, f: impl FnOnce(&mut MockContract)) {
        let mut state = self.state.lock().unwrap();
        let contract = state.contracts.get_mut(address).unwrap();
        f(contract);
    }

    pub fn set_balance(&self, address: &str, holder: &str, amount: u128) {
        self.with_contract(address, |c| {
            c.balances.insert(holder.to_owned(), amount.into());
        });
    }

    pub fn set_supply(&self, address: &str, supply: u128) {
        self.with_contract(address, |c| c.info.total_supply = supply.into());
    }

    pub fn set_allowance(&self, address: &str, owner: &str, spender: &str, amount: u128, expires: Expiration) {
        self.with_contract(address, |c| {
            c.allowances
                .insert((owner.to_owned(), spender.to_owned()), (amount.into(), expires));
        });
    }

    pub fn push_block(&self, block: Block) {
        let mut state = self.state.lock().unwrap();
        state.height = state.height.max(block.height);
        state.blocks.insert(block.height, block);
    }

    fn contract(&self, address: &str) -> Result<MockContract, ChainError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ChainError::Status {
                status: 503,
                body: "node unavailable".into(),
            });
        }
        state
            .contracts
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::Status {
                status: 404,
                body: format!("contract {address} not found"),
            })
    }
}

fn entries(contract: MockContract) -> Vec<StateEntry> {
    if let Some(raw) = contract.raw_state {
        return raw;
    }

    let mut entries = vec![StateEntry::new(
        b"token_info".to_vec(),
        serde_json::to_vec(&contract.info).unwrap(),
    )];
    for (holder, amount) in &contract.balances {
        entries.push(StateEntry::new(
            map_key(b"balance", &[holder.as_bytes()]),
            serde_json::to_vec(amount).unwrap(),
        ));
    }
    for ((owner, spender), (amount, expires)) in &contract.allowances {
        entries.push(StateEntry::new(
            map_key(b"allowance", &[owner.as_bytes(), spender.as_bytes()]),
            serde_json::to_vec(&json!({"allowance": amount, "expires": expires})).unwrap(),
        ));
    }
    entries
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn full_state(&self, address: &str, _height: u64) -> Result<Vec<StateEntry>, ChainError> {
        self.full_state_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.full_state_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(entries(self.contract(address)?))
    }

    async fn balance(&self, address: &str, holder: &str, _height: u64) -> Result<Amount, ChainError> {
        Ok(self
            .contract(address)?
            .balances
            .get(holder)
            .copied()
            .unwrap_or(Amount::ZERO))
    }

    async fn circulating_supply(&self, address: &str, _height: u64) -> Result<Amount, ChainError> {
        Ok(self.contract(address)?.info.total_supply)
    }

    async fn allowance(
        &self,
        address: &str,
        owner: &str,
        spender: &str,
        _height: u64,
    ) -> Result<(Amount, Expiration), ChainError> {
        Ok(self
            .contract(address)?
            .allowances
            .get(&(owner.to_owned(), spender.to_owned()))
            .copied()
            .unwrap_or((Amount::ZERO, Expiration::Never {})))
    }

    async fn latest_height(&self) -> Result<u64, ChainError> {
        let state = self.state.lock().unwrap();
        if state.unavailable {
            return Err(ChainError::Status {
                status: 503,
                body: "node unavailable".into(),
            });
        }
        Ok(state.height)
    }
}

#[async_trait]
impl BlockSource for MockChain {
    async fn block(&self, height: u64) -> Result<Block, ChainError> {
        self.state
            .lock()
            .unwrap()
            .blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| ChainError::Status {
                status: 404,
                body: format!("block {height} not found"),
            })
    }
}
