//! Verbose raw transactions with and without a transaction index.

use super::{flag, import_funded, import_master, reserve_all};
use crate::context::{ScenarioContext, array_field};
use crate::error::{AssertionFailure, Result};
use crate::runner::Scenario;
use async_trait::async_trait;
use chainharness_rpc::RpcErrorKind;
use serde_json::{Value, json};

const RECEIVER_MNEMONIC: &str =
    "graine article givre hublot encadrer admirer stipuler capsule acajou paisible soutirer organe";

const FIVE_COINS_SAT: u64 = 500_000_000;

pub struct TxIndexScenario;

fn pays_to(output: &Value, address: &str) -> bool {
    output["scriptPubKey"]["addresses"]
        .as_array()
        .is_some_and(|addresses| addresses.iter().any(|a| a.as_str() == Some(address)))
}

#[async_trait]
impl Scenario for TxIndexScenario {
    fn name(&self) -> &'static str {
        "txindex"
    }

    fn description(&self) -> &'static str {
        "verbose raw transaction outputs, before and after confirmation"
    }

    fn node_count(&self) -> usize {
        4
    }

    fn node_args(&self) -> Vec<Vec<String>> {
        let mut args = vec![flag("debug")];
        for _ in 1..4 {
            args.push(vec!["-debug".to_string(), "-txindex".to_string()]);
        }
        args
    }

    async fn setup_network(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.connect_star().await
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.step("sync");
        ctx.sync_all().await?;
        reserve_all(ctx).await?;

        ctx.step("import wallets");
        import_funded(ctx, 0).await?;
        import_master(ctx, 1, RECEIVER_MNEMONIC).await?;
        let addr1 = ctx
            .node(1)?
            .call_as::<String>("getnewaddress", json!([]))
            .await?;

        ctx.step("send to node1");
        let txid = ctx
            .node(0)?
            .call_as::<String>("sendtoaddress", json!([addr1, 5]))
            .await?;

        ctx.step("verbose mempool transaction");
        let verbose = ctx.call(0, "getrawtransaction", json!([txid, 1])).await?;
        let vout = array_field(&verbose, "vout")?;
        ctx.ensure_eq(vout.len(), 2, "output count")?;

        let payment = vout
            .iter()
            .find(|output| pays_to(output, &addr1))
            .ok_or_else(|| AssertionFailure::new(format!("no output pays {addr1}")))?;
        ctx.ensure_eq(payment["valueSat"].as_u64(), Some(FIVE_COINS_SAT), "payment valueSat")?;
        ctx.ensure_eq(payment["value"].as_f64(), Some(5.0), "payment value")?;

        ctx.step("confirm");
        ctx.await_mempool(1, &txid).await?;
        ctx.stake_to_height(0, 1).await?;
        ctx.sync_all().await?;

        ctx.step("indexed lookup");
        let confirmed = ctx.call(1, "getrawtransaction", json!([txid, 1])).await?;
        let block_hash = ctx.node(1)?.get_block_hash(1).await?;
        ctx.ensure_eq(
            confirmed["blockhash"].as_str(),
            Some(block_hash.as_str()),
            "indexed transaction names its block",
        )?;

        // node0 runs without -txindex and can no longer see the transaction
        let outcome = ctx
            .node(0)?
            .call("getrawtransaction", json!([txid, 1]))
            .await;
        ctx.expect_rpc_error(outcome, RpcErrorKind::NotFound, "No such mempool transaction")?;

        Ok(())
    }
}
