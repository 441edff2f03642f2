//! Block lookup by timestamp range.

use super::{flag, import_funded, reserve_all};
use crate::context::ScenarioContext;
use crate::error::Result;
use crate::runner::Scenario;
use async_trait::async_trait;
use chainharness_rpc::RpcErrorKind;
use serde_json::json;

/// Width of the queried window, in seconds.
const WINDOW_SECS: u64 = 76;

const BLOCKS: u64 = 3;

pub struct TimestampIndexScenario;

#[async_trait]
impl Scenario for TimestampIndexScenario {
    fn name(&self) -> &'static str {
        "timestampindex"
    }

    fn description(&self) -> &'static str {
        "timestamp range query returns the staked block hashes in order"
    }

    fn node_count(&self) -> usize {
        4
    }

    fn node_args(&self) -> Vec<Vec<String>> {
        let indexed = vec!["-debug".to_string(), "-timestampindex".to_string()];
        vec![flag("debug"), indexed.clone(), flag("debug"), indexed]
    }

    async fn setup_network(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.connect_star().await
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.step("sync");
        ctx.sync_all().await?;
        reserve_all(ctx).await?;
        import_funded(ctx, 0).await?;

        ctx.step("stake blocks");
        let mut hashes = Vec::new();
        for height in 1..=BLOCKS {
            ctx.stake_to_height(0, height).await?;
            hashes.push(ctx.node(0)?.get_block_hash(height).await?);
        }
        ctx.sync_all().await?;

        ctx.step("chains agree");
        for index in 1..ctx.node_count() {
            ctx.await_height(index, BLOCKS).await?;
            let node = ctx.node(index)?;
            ctx.ensure_eq(node.get_block_count().await?, BLOCKS, format!("node{index} block count"))?;
            let mut theirs = Vec::new();
            for height in 1..=BLOCKS {
                theirs.push(node.get_block_hash(height).await?);
            }
            ctx.ensure_eq(&theirs, &hashes, format!("node{index} block hashes"))?;
        }

        ctx.step("query timestamp index");
        let low = ctx.node(1)?.get_block(&hashes[0]).await?.time;
        let high = low + WINDOW_SECS;
        let found = ctx
            .node(1)?
            .call_as::<Vec<String>>("getblockhashes", json!([high, low]))
            .await?;
        ctx.ensure_eq(found.len(), hashes.len(), "hashes in window")?;
        ctx.ensure_eq(&found, &hashes, "hashes in window, in order")?;

        // node2 runs without -timestampindex
        let outcome = ctx
            .node(2)?
            .call("getblockhashes", json!([high, low]))
            .await;
        ctx.expect_rpc_error(outcome, RpcErrorKind::FeatureDisabled, "not enabled")?;

        Ok(())
    }
}
