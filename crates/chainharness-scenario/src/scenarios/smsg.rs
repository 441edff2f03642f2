//! Secure messaging between two linked nodes.

use super::{FUNDED_MNEMONIC, import_master};
use crate::context::{ScenarioContext, array_field, str_field};
use crate::error::Result;
use crate::runner::Scenario;
use async_trait::async_trait;
use chainharness_rpc::RpcErrorKind;
use serde_json::{Value, json};

pub struct SmsgScenario;

async fn send(ctx: &ScenarioContext, node: usize, from: &str, to: &str, text: &str) -> Result<()> {
    let ro = ctx.call(node, "smsgsend", json!([from, to, text])).await?;
    ctx.ensure_eq(str_field(&ro, "result")?, "Sent.", format!("node{node} smsgsend {text:?}"))
}

async fn messages(ctx: &ScenarioContext, node: usize, method: &str) -> Result<Vec<Value>> {
    let ro = ctx.call(node, method, json!([])).await?;
    Ok(array_field(&ro, "messages")?.clone())
}

fn message_field<'a>(messages: &'a [Value], index: usize, field: &str) -> Result<&'a str> {
    let message = messages.get(index).unwrap_or(&Value::Null);
    str_field(message, field)
}

#[async_trait]
impl Scenario for SmsgScenario {
    fn name(&self) -> &'static str {
        "smsg"
    }

    fn description(&self) -> &'static str {
        "secure message exchange, key discovery and disabled-feature rejection"
    }

    fn node_count(&self) -> usize {
        2
    }

    fn node_args(&self) -> Vec<Vec<String>> {
        vec![vec!["-smsgscanincoming".to_string()]; 2]
    }

    async fn setup_network(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.connect(0, 1, true).await
    }

    async fn run(&self, ctx: &mut ScenarioContext) -> Result<()> {
        ctx.step("import keys");
        let ro = ctx.call(0, "mnemonic", json!(["new"])).await?;
        let master = str_field(&ro, "master")?.to_string();
        import_master(ctx, 0, &master).await?;
        import_master(ctx, 1, FUNDED_MNEMONIC).await?;

        let address0 = ctx.node(0)?.call_as::<String>("getnewaddress", json!([])).await?;
        let address1 = ctx.node(1)?.call_as::<String>("getnewaddress", json!([])).await?;
        ctx.ensure(!address0.is_empty() && !address1.is_empty(), "addresses issued")?;
        ctx.ensure(address0 != address1, "addresses differ between wallets")?;

        let info = ctx.node(1)?.get_network_info().await?;
        ctx.ensure(
            info.localservices_str.contains("SMSG"),
            "node1 advertises the SMSG service",
        )?;

        ctx.step("share public key");
        let ro = ctx.call(0, "smsglocalkeys", json!([])).await?;
        let keys = array_field(&ro, "keys")?;
        ctx.ensure_eq(keys.len(), 1, "node0 local smsg keys")?;
        let public_key = str_field(&keys[0], "public_key")?.to_string();

        let ro = ctx
            .call(1, "smsgaddkey", json!([address0, public_key]))
            .await?;
        ctx.ensure_eq(str_field(&ro, "result")?, "Added public key to db.", "smsgaddkey result")?;

        let buckets = ctx.node(1)?.smsg_buckets().await?;
        ctx.ensure_eq(buckets.total.buckets, 0, "node1 buckets before sending")?;

        ctx.step("node1 -> node0");
        send(ctx, 1, &address1, &address0, "Test 1->0.").await?;
        ctx.wait_for_exchange(1, 1, 0).await?;

        let inbox = messages(ctx, 0, "smsginbox").await?;
        ctx.ensure_eq(inbox.len(), 1, "node0 inbox size")?;
        ctx.ensure_eq(message_field(&inbox, 0, "from")?, address1.as_str(), "sender of first message")?;
        ctx.ensure_eq(message_field(&inbox, 0, "text")?, "Test 1->0.", "text of first message")?;

        // node0 learnt address1's key from the incoming message
        ctx.step("node0 -> node1");
        send(ctx, 0, &address0, &address1, "Reply 0->1.").await?;
        ctx.wait_for_exchange(2, 0, 1).await?;

        let inbox = messages(ctx, 1, "smsginbox").await?;
        ctx.ensure_eq(message_field(&inbox, 0, "to")?, address1.as_str(), "recipient of reply")?;
        ctx.ensure_eq(message_field(&inbox, 0, "text")?, "Reply 0->1.", "text of reply")?;

        let all = messages(ctx, 1, "smsgview").await?;
        ctx.ensure_eq(all.len(), 2, "node1 stored messages")?;
        let outbox = messages(ctx, 1, "smsgoutbox").await?;
        ctx.ensure_eq(outbox.len(), 1, "node1 outbox size")?;

        ctx.step("send while disabled");
        ctx.call(1, "smsgdisable", json!([])).await?;
        let outcome = ctx
            .node(1)?
            .call("smsgsend", json!([address1, address0, "Test 1->0. 2"]))
            .await;
        let rejected = ctx.expect_rpc_error(outcome, RpcErrorKind::FeatureDisabled, "disabled")?;
        ctx.ensure(
            rejected.message.contains("Secure messaging is disabled."),
            "rejection names secure messaging",
        )?;

        ctx.step("re-enable and resend");
        ctx.call(1, "smsgenable", json!([])).await?;
        send(ctx, 1, &address1, &address0, "Test 1->0. 2").await?;
        ctx.wait_for_exchange(3, 1, 0).await?;

        let inbox = messages(ctx, 0, "smsginbox").await?;
        ctx.ensure_eq(inbox.len(), 1, "node0 unread messages")?;
        ctx.ensure_eq(message_field(&inbox, 0, "from")?, address1.as_str(), "sender of resent message")?;
        ctx.ensure_eq(message_field(&inbox, 0, "text")?, "Test 1->0. 2", "text of resent message")?;

        Ok(())
    }
}
