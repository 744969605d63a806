//! Keeps tracked tokens in step with the transactions that touch them.
//!
//! Nothing is computed locally: every affected balance, supply or allowance is read back
//! from the chain at the transaction's height and overwritten, so a missed or repeated
//! message cannot leave the ledger drifting.

use anyhow::Context;
use futures::future::try_join_all;
use tokenwatch_core::{
    Allowance, Block, BlockInfo, ContractMessage, ExecuteMsg, SettledTransaction, TokenSnapshot,
};

use super::IndexContext;
use crate::{
    chain::{BlockSource, ChainError},
    db::{self, contracts::Contract},
};

/// Applies one message of a settled transaction. Every write it makes lands in one store
/// transaction, so an error leaves the ledger as it was.
pub async fn on_message(
    ctx: &IndexContext,
    index: usize,
    msg: &ContractMessage,
    tx: &SettledTransaction,
) -> anyhow::Result<()> {
    if !tx.has_logs() {
        tracing::debug!("Transaction {} carries no logs, skipping", tx.hash);
        return Ok(());
    }

    match msg {
        ContractMessage::Instantiate {
            sender,
            admin,
            code_id,
            label,
        } => {
            let Some(address) = tx.instantiated_address(index) else {
                tracing::warn!(
                    "No contract address in log of message {index} of {}",
                    tx.hash
                );
                return Ok(());
            };
            let contract = Contract {
                address: address.to_owned(),
                code_id: *code_id,
                creator: sender.clone(),
                admin: admin.clone(),
                label: label.clone(),
                height: tx.height,
            };
            instantiate(ctx, &contract).await
        }
        ContractMessage::Execute {
            sender,
            contract,
            msg,
        } => execute(ctx, tx, sender, contract, msg).await,
        ContractMessage::Migrate {
            contract, code_id, ..
        } => migrate(ctx, contract, *code_id, tx.height).await,
        ContractMessage::Other(_) => Ok(()),
    }
}

async fn instantiate(ctx: &IndexContext, contract: &Contract) -> anyhow::Result<()> {
    let _guard = ctx.guard.lock("instantiate").await;

    if !db::code_ids::is_verified(&ctx.pool, contract.code_id).await? {
        db::contracts::insert(&ctx.pool, contract).await?;
        return Ok(());
    }

    let address = &contract.address;
    let entries = ctx.chain.full_state(address, contract.height).await?;
    let snapshot = match TokenSnapshot::from_entries(&entries) {
        Ok(snapshot) => Some(snapshot.into_token(address, contract.code_id)),
        Err(err) => {
            tracing::warn!("Not tracking {address}: {err}");
            None
        }
    };

    let mut tx = ctx.pool.begin().await?;
    db::contracts::insert(&mut tx, contract).await?;
    if let Some(token) = &snapshot {
        db::tokens::insert(&mut tx, token, contract.height).await?;
        tracing::info!("Tracking new token {} ({address})", token.symbol);
    }
    tx.commit().await?;
    Ok(())
}

async fn execute(
    ctx: &IndexContext,
    tx: &SettledTransaction,
    sender: &str,
    contract: &str,
    payload: &[u8],
) -> anyhow::Result<()> {
    if !db::tokens::is_tracked(&ctx.pool, contract).await? {
        return Ok(());
    }

    let msg = match ExecuteMsg::decode(payload) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::warn!("Ignoring execute message to {contract} in {}: {err}", tx.hash);
            return Ok(());
        }
    };
    let height = tx.height;

    match &msg {
        ExecuteMsg::UpdateMinter(update) => {
            db::tokens::set_minter(&ctx.pool, contract, update.new_minter.as_deref(), height)
                .await
        }
        ExecuteMsg::UpdateMarketing(update) => {
            let mut db_tx = ctx.pool.begin().await?;
            if let Some(token) = db::tokens::get(&mut db_tx, contract).await? {
                let mut marketing = token.marketing();
                update.apply(&mut marketing);
                db::tokens::set_marketing(&mut db_tx, contract, &marketing, height).await?;
            }
            db_tx.commit().await?;
            Ok(())
        }
        ExecuteMsg::UploadLogo(logo) => db::tokens::set_logo(&ctx.pool, contract, logo, height).await,
        _ => refresh(ctx, contract, sender, &msg, height).await,
    }
}

/// Re-reads whatever the operation may have changed and overwrites it.
async fn refresh(
    ctx: &IndexContext,
    contract: &str,
    sender: &str,
    msg: &ExecuteMsg,
    height: u64,
) -> anyhow::Result<()> {
    let supply = if msg.changes_supply() {
        Some(ctx.chain.circulating_supply(contract, height).await?)
    } else {
        None
    };

    let holders = msg.balance_holders(sender).unwrap_or_default();
    let balances = try_join_all(holders.into_iter().map(|holder| async move {
        let amount = ctx.chain.balance(contract, &holder, height).await?;
        Ok::<_, ChainError>((holder, amount))
    }))
    .await?;

    let allowance = match msg.allowance_key(sender) {
        Some((owner, spender)) => {
            let (amount, expires) = ctx
                .chain
                .allowance(contract, &owner, &spender, height)
                .await?;
            Some(Allowance {
                owner,
                spender,
                amount,
                expires,
            })
        }
        None => None,
    };

    if supply.is_none() && balances.is_empty() && allowance.is_none() {
        tracing::trace!("{} on {contract} leaves the ledger unchanged", msg.operation());
        return Ok(());
    }

    let mut tx = ctx.pool.begin().await?;
    if let Some(supply) = supply {
        db::tokens::set_supply(&mut tx, contract, supply, height).await?;
    }
    for (holder, amount) in &balances {
        db::balances::set(&mut tx, contract, holder, *amount, height).await?;
    }
    if let Some(allowance) = &allowance {
        db::allowances::set(&mut tx, contract, allowance, height).await?;
    }
    tx.commit().await?;

    tracing::debug!(
        "{} on {contract} at {height}: refreshed {} balances",
        msg.operation(),
        balances.len()
    );
    Ok(())
}

async fn migrate(
    ctx: &IndexContext,
    address: &str,
    code_id: u64,
    height: u64,
) -> anyhow::Result<()> {
    let _guard = ctx.guard.lock("migrate").await;

    let verified = db::code_ids::is_verified(&ctx.pool, code_id).await?;
    let tracked = db::tokens::is_tracked(&ctx.pool, address).await?;

    let token = if verified && !tracked {
        let entries = ctx.chain.full_state(address, height).await?;
        match TokenSnapshot::from_entries(&entries) {
            Ok(snapshot) => Some(snapshot.into_token(address, code_id)),
            Err(err) => {
                tracing::warn!("Not tracking migrated contract {address}: {err}");
                None
            }
        }
    } else {
        None
    };

    let mut tx = ctx.pool.begin().await?;
    db::contracts::set_code_id(&mut tx, address, code_id).await?;
    match (tracked, verified) {
        (true, true) => db::tokens::set_code_id(&mut tx, address, code_id, height).await?,
        (true, false) => {
            tracing::info!("{address} migrated to unverified code id {code_id}, no longer tracked");
            db::tokens::delete(&mut tx, address).await?;
        }
        (false, true) => {
            if let Some(token) = &token {
                tracing::info!("{address} migrated to verified code id {code_id}, now tracked");
                db::tokens::insert(&mut tx, token, height).await?;
            }
        }
        (false, false) => {}
    }
    tx.commit().await?;
    Ok(())
}

/// Applies every message of a block's successful transactions, then records the block.
pub async fn index_block(ctx: &IndexContext, block: &Block) -> anyhow::Result<()> {
    for tx in block.transactions.iter().filter(|tx| tx.success) {
        for (index, msg) in tx.messages.iter().enumerate() {
            on_message(ctx, index, msg, tx)
                .await
                .with_context(|| format!("message {index} of {} at {}", tx.hash, block.height))?;
        }
    }

    let info = BlockInfo {
        height: block.height,
        time: block.time,
    };
    db::blocks::insert(&ctx.pool, &info, &block.hash).await?;
    Ok(())
}

/// Replays blocks from the last indexed one up to the chain head. Stops at the first
/// block that fails, leaving it to be retried by the next call.
pub async fn index_blocks(
    ctx: &IndexContext,
    blocks: &dyn BlockSource,
    start_height: u64,
) -> anyhow::Result<u64> {
    let head = ctx.chain.latest_height().await?;
    let mut height = db::blocks::next_height(&ctx.pool, start_height).await?;
    let mut indexed = 0;

    while height <= head {
        let block = blocks.block(height).await?;
        index_block(ctx, &block).await?;
        indexed += 1;
        height += 1;
    }

    if indexed > 0 {
        tracing::info!("Indexed {indexed} blocks up to height {head}");
    }
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tokenwatch_core::{Amount, Event, Expiration, Marketing, Timestamp, TxLog};

    use super::*;
    use crate::{
        chain::mock::MockChain,
        db::tokens::tests::token,
        subcommands::index::test_util::{context, record_contract, track},
    };

    fn log(kind: &str, attrs: Value) -> Vec<TxLog> {
        vec![TxLog {
            msg_index: 0,
            events: vec![serde_json::from_value::<Event>(json!({
                "type": kind,
                "attributes": attrs
            }))
            .unwrap()],
        }]
    }

    fn settled(height: u64, msg: ContractMessage, logs: Vec<TxLog>) -> SettledTransaction {
        SettledTransaction {
            hash: format!("TX{height}"),
            height,
            success: true,
            messages: vec![msg],
            logs,
        }
    }

    fn execute(sender: &str, contract: &str, height: u64, msg: &Value) -> SettledTransaction {
        settled(
            height,
            ContractMessage::Execute {
                sender: sender.into(),
                contract: contract.into(),
                msg: serde_json::to_vec(msg).unwrap(),
            },
            log("execute", json!([{"key": "_contract_address", "value": contract}])),
        )
    }

    fn instantiate(address: &str, code_id: u64, height: u64) -> SettledTransaction {
        settled(
            height,
            ContractMessage::Instantiate {
                sender: "wasm1creator".into(),
                admin: Some("wasm1admin".into()),
                code_id,
                label: "token".into(),
            },
            log("instantiate", json!([{"key": "_contract_address", "value": address}])),
        )
    }

    fn migrate_tx(address: &str, code_id: u64, height: u64) -> SettledTransaction {
        settled(
            height,
            ContractMessage::Migrate {
                sender: "wasm1admin".into(),
                contract: address.into(),
                code_id,
            },
            log("migrate", json!([{"key": "code_id", "value": code_id.to_string()}])),
        )
    }

    async fn apply(ctx: &IndexContext, tx: &SettledTransaction) -> anyhow::Result<()> {
        on_message(ctx, 0, &tx.messages[0], tx).await
    }

    async fn balance(ctx: &IndexContext, holder: &str) -> Amount {
        db::balances::get(&ctx.pool, "wasm1moon", holder).await.unwrap()
    }

    #[tokio::test]
    async fn test_transfer_refetches_both_holders() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20), ("wasm1b", 20)]);
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20), ("wasm1b", 20)])).await;
        // Local figures that have drifted are overwritten, not adjusted.
        db::balances::set(&ctx.pool, "wasm1moon", "wasm1b", 999.into(), 5)
            .await
            .unwrap();

        chain.set_balance("wasm1moon", "wasm1a", 15);
        chain.set_balance("wasm1moon", "wasm1b", 25);
        let tx = execute(
            "wasm1a",
            "wasm1moon",
            11,
            &json!({"transfer": {"recipient": "wasm1b", "amount": "5"}}),
        );
        apply(&ctx, &tx).await.unwrap();

        assert_eq!(balance(&ctx, "wasm1a").await, 15.into());
        assert_eq!(balance(&ctx, "wasm1b").await, 25.into());
    }

    #[tokio::test]
    async fn test_burn_refreshes_supply_and_drops_empty_holder() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20)])).await;

        chain.set_balance("wasm1moon", "wasm1a", 0);
        chain.set_supply("wasm1moon", 0);
        let tx = execute("wasm1a", "wasm1moon", 11, &json!({"burn": {"amount": "20"}}));
        apply(&ctx, &tx).await.unwrap();

        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.total_supply().unwrap(), Amount::ZERO);
        assert!(db::balances::for_token(&ctx.pool, "wasm1moon")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_transfer_from_refreshes_allowance() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1owner", 20)]);
        chain.set_allowance("wasm1moon", "wasm1owner", "wasm1spender", 3, Expiration::AtHeight(50));
        chain.set_balance("wasm1moon", "wasm1owner", 18);
        chain.set_balance("wasm1moon", "wasm1c", 2);
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1owner", 20)])).await;

        let tx = execute(
            "wasm1spender",
            "wasm1moon",
            11,
            &json!({"transfer_from": {"owner": "wasm1owner", "recipient": "wasm1c", "amount": "2"}}),
        );
        apply(&ctx, &tx).await.unwrap();

        assert_eq!(balance(&ctx, "wasm1owner").await, 18.into());
        assert_eq!(balance(&ctx, "wasm1c").await, 2.into());
        let allowance = db::allowances::get(&ctx.pool, "wasm1moon", "wasm1owner", "wasm1spender")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(allowance.amount, 3.into());
        assert_eq!(allowance.expires, Expiration::AtHeight(50));
    }

    #[tokio::test]
    async fn test_metadata_updates_need_no_query() {
        let chain = Arc::new(MockChain::new(10));
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[])).await;
        db::tokens::set_marketing(
            &ctx.pool,
            "wasm1moon",
            &Marketing {
                project: Some("https://moon.example".into()),
                description: Some("old".into()),
                marketing: None,
            },
            1,
        )
        .await
        .unwrap();
        // Any query would fail.
        chain.set_unavailable(true);

        for msg in [
            json!({"update_minter": {"new_minter": null}}),
            json!({"update_marketing": {"description": "new", "project": ""}}),
            json!({"upload_logo": {"url": "https://moon.example/logo.png"}}),
        ] {
            apply(&ctx, &execute("wasm1minter", "wasm1moon", 11, &msg))
                .await
                .unwrap();
        }

        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.minter, None);
        assert_eq!(row.description.as_deref(), Some("new"));
        assert_eq!(row.project, None);
        assert_eq!(
            row.logo.as_deref(),
            Some(r#"{"url":"https://moon.example/logo.png"}"#)
        );
    }

    #[tokio::test]
    async fn test_undecodable_and_untracked_are_ignored() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20)])).await;
        chain.set_unavailable(true);

        let two_keys = json!({"transfer": {"recipient": "wasm1b", "amount": "1"}, "burn": {"amount": "1"}});
        apply(&ctx, &execute("wasm1a", "wasm1moon", 11, &two_keys))
            .await
            .unwrap();
        apply(&ctx, &execute("wasm1a", "wasm1moon", 11, &json!({"transfer": {}})))
            .await
            .unwrap();
        apply(
            &ctx,
            &execute("wasm1a", "wasm1other", 11, &json!({"burn": {"amount": "1"}})),
        )
        .await
        .unwrap();

        assert_eq!(balance(&ctx, "wasm1a").await, 20.into());
    }

    #[tokio::test]
    async fn test_query_failure_aborts_message() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20)])).await;
        chain.set_unavailable(true);

        let tx = execute("wasm1a", "wasm1moon", 11, &json!({"mint": {"recipient": "wasm1b", "amount": "5"}}));
        assert!(apply(&ctx, &tx).await.is_err());
        assert_eq!(balance(&ctx, "wasm1a").await, 20.into());
    }

    #[tokio::test]
    async fn test_transaction_without_logs_is_skipped() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[]);
        let ctx = context(&chain).await;
        db::code_ids::insert(&ctx.pool, 7).await.unwrap();

        let mut tx = instantiate("wasm1moon", 7, 11);
        tx.logs = vec![];
        apply(&ctx, &tx).await.unwrap();

        assert!(!db::tokens::is_tracked(&ctx.pool, "wasm1moon").await.unwrap());
        assert_eq!(chain.full_state_calls(), 0);
    }

    #[tokio::test]
    async fn test_instantiate_tracks_only_verified_code_ids() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        chain.add_token("wasm1other", "OTHER", &[]);
        let ctx = context(&chain).await;
        db::code_ids::insert(&ctx.pool, 7).await.unwrap();

        apply(&ctx, &instantiate("wasm1moon", 7, 11)).await.unwrap();
        apply(&ctx, &instantiate("wasm1other", 8, 11)).await.unwrap();

        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.code_id, 7);
        assert_eq!(row.symbol, "MOON");
        assert_eq!(balance(&ctx, "wasm1a").await, 20.into());
        assert!(!db::tokens::is_tracked(&ctx.pool, "wasm1other").await.unwrap());
        assert_eq!(
            db::contracts::untracked(&ctx.pool, 8).await.unwrap(),
            vec!["wasm1other".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_migration_away_drops_token() {
        let chain = Arc::new(MockChain::new(10));
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20)])).await;
        db::code_ids::insert(&ctx.pool, 8).await.unwrap();

        apply(&ctx, &migrate_tx("wasm1moon", 8, 11)).await.unwrap();
        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.code_id, 8);

        apply(&ctx, &migrate_tx("wasm1moon", 9, 12)).await.unwrap();
        assert!(db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().is_none());
        assert_eq!(balance(&ctx, "wasm1a").await, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_migration_into_verified_code_id_starts_tracking() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        let ctx = context(&chain).await;
        record_contract(&ctx, "wasm1moon", 3, 1).await;
        db::code_ids::insert(&ctx.pool, 7).await.unwrap();

        apply(&ctx, &migrate_tx("wasm1moon", 7, 11)).await.unwrap();
        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.code_id, 7);
        assert_eq!(row.height, 11);
    }

    fn block(height: u64, transactions: Vec<SettledTransaction>) -> Block {
        Block {
            height,
            time: Timestamp::from_nanos(height * 1_000_000_000),
            hash: format!("BLOCK{height}"),
            transactions,
        }
    }

    #[tokio::test]
    async fn test_index_blocks_replays_to_head() {
        let chain = Arc::new(MockChain::new(0));
        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 20)]);
        let ctx = context(&chain).await;
        db::code_ids::insert(&ctx.pool, 7).await.unwrap();

        let mut failed = instantiate("wasm1ghost", 7, 6);
        failed.success = false;
        chain.push_block(block(5, vec![instantiate("wasm1moon", 7, 5)]));
        chain.push_block(block(6, vec![failed]));

        assert_eq!(index_blocks(&ctx, chain.as_ref(), 5).await.unwrap(), 2);
        assert!(db::tokens::is_tracked(&ctx.pool, "wasm1moon").await.unwrap());
        assert!(!db::tokens::is_tracked(&ctx.pool, "wasm1ghost").await.unwrap());
        assert_eq!(db::blocks::latest(&ctx.pool).await.unwrap().unwrap().height, 6);

        assert_eq!(index_blocks(&ctx, chain.as_ref(), 5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failing_block_is_not_recorded() {
        let chain = Arc::new(MockChain::new(0));
        let ctx = context(&chain).await;
        track(&ctx, &token("wasm1moon", 7, &[("wasm1a", 20)])).await;
        chain.push_block(block(
            5,
            vec![execute("wasm1a", "wasm1moon", 5, &json!({"burn": {"amount": "1"}}))],
        ));

        // The chain does not know the contract yet, so the refetch fails.
        assert!(index_blocks(&ctx, chain.as_ref(), 5).await.is_err());
        assert_eq!(db::blocks::latest(&ctx.pool).await.unwrap(), None);

        chain.add_token("wasm1moon", "MOON", &[("wasm1a", 19)]);
        assert_eq!(index_blocks(&ctx, chain.as_ref(), 5).await.unwrap(), 1);
        assert_eq!(balance(&ctx, "wasm1a").await, 19.into());
        let row = db::tokens::get(&ctx.pool, "wasm1moon").await.unwrap().unwrap();
        assert_eq!(row.total_supply, "19");
    }
}
