//! Private-value transfers across three nodes.

use super::{flag, import_funded, import_master, reserve_all};
use crate::context::ScenarioContext;
use crate::error::Result;
use crate::runner::Scenario;
use async_trait::async_trait;
use serde_json::{Value, json};

const RECEIVER_MNEMONIC: &str = "drip fog service village program equip minute dentist series hawk crop sphere \
     olympic lazy garbage segment fox library good alley steak jazz force inmate";

pub struct AnonScenario;

/// Calls one of the `send*to*` methods and returns the txid.
async fn send(
    ctx: &ScenarioContext,
    node: usize,
    method: &str,
    to: &str,
    amount: f64,
    narration: &str,
    extra: &[Value],
) -> Result<String> {
    let mut params = vec![json!(to), json!(amount), json!(""), json!(""), json!(false), json!(narration)];
    params.extend_from_slice(extra);
    let txid = ctx
        .node(node)?
        .call_as::<String>(method, Value::Array(params))
        .await?;
    ctx.ensure(!txid.is_empty(), format!("node{node} {method} returned a txid"))?;
    Ok(txid)
}

/// Stakes block `height` on node0 and checks node1 received it with `txids`.
async fn stake_and_check_inclusion(ctx: &ScenarioContext, height: u64, txids: &[String]) -> Result<()> {
    ctx.stake_to_height(0, height).await?;
    ctx.await_height(1, height).await?;

    let node1 = ctx.node(1)?;
    let hash = node1.get_block_hash(height).await?;
    let block = node1.get_block(&hash).await?;
    for txid in txids {
        ctx.ensure(
            block.tx.contains(txid),
            format!("block {height} includes {txid}"),
        )?;
    }
    Ok(())
}

#[async_trait]
impl Scenario for AnonScenario {
    fn name(&self) -> &'static str {
        "anon"
    }

    fn description(&self) -> &'static str {
        "blind and anon sends propagate and are staked into blocks"
    }

    fn node_count(&self) -> usize {
        3
    }

    fn node_args(&self) -> Vec<Vec<String>> {
        vec![flag("debug"); 3]
    }

    async fn setup_network(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.connect(0, 1, true).await?;
        ctx.connect(0, 2, true).await
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.step("sync");
        ctx.sync_all().await?;
        reserve_all(ctx).await?;

        ctx.step("import wallets");
        import_funded(ctx, 0).await?;
        import_master(ctx, 1, RECEIVER_MNEMONIC).await?;

        let sx_to_1 = ctx
            .node(1)?
            .call_as::<String>("getnewstealthaddress", json!([]))
            .await?;
        let sx_to_0 = ctx
            .node(0)?
            .call_as::<String>("getnewstealthaddress", json!([]))
            .await?;
        ctx.ensure(sx_to_1 != sx_to_0, "stealth addresses differ between wallets")?;

        ctx.step("send to anon and blind");
        let mut txids = vec![
            send(ctx, 0, "sendparttoanon", &sx_to_1, 1.0, "node0 -> node1 p->a", &[]).await?,
            send(ctx, 0, "sendparttoblind", &sx_to_0, 1000.0, "node0 -> node0 p->b", &[]).await?,
        ];
        for i in 1..=4 {
            let narration = format!("node0 -> node1 b->a {i}");
            txids.push(send(ctx, 0, "sendblindtoanon", &sx_to_1, 100.0, &narration, &[]).await?);
        }
        for _ in 0..6 {
            txids.push(send(ctx, 0, "sendparttoanon", &sx_to_1, 10.0, "node0 -> node1 p->a", &[]).await?);
        }
        if let Some(last) = txids.last() {
            ctx.await_mempool(1, last).await?;
        }

        ctx.step("stake block 1");
        stake_and_check_inclusion(ctx, 1, &txids).await?;

        ctx.step("anon to anon");
        let txid = send(ctx, 1, "sendanontoanon", &sx_to_0, 1.0, "node1 -> node0 a->a", &[]).await?;
        ctx.await_mempool(0, &txid).await?;

        ctx.step("stake block 2");
        stake_and_check_inclusion(ctx, 2, &[txid]).await?;

        ctx.step("anon to anon with ring size");
        let txid = send(
            ctx,
            1,
            "sendanontoanon",
            &sx_to_0,
            101.0,
            "node1 -> node0 a->a",
            &[json!(5), json!(1)],
        )
        .await?;
        ctx.await_mempool(0, &txid).await?;

        let txid = send(ctx, 1, "sendanontoanon", &sx_to_0, 0.1, "", &[json!(5), json!(2)]).await?;
        ctx.await_mempool(0, &txid).await?;

        Ok(())
    }
}
