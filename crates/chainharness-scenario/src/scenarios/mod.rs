//! Built-in scenarios.

mod anon;
mod smsg;
mod timestampindex;
mod txindex;

pub use anon::AnonScenario;
pub use smsg::SmsgScenario;
pub use timestampindex::TimestampIndexScenario;
pub use txindex::TxIndexScenario;

use crate::context::{ScenarioContext, str_field};
use crate::error::Result;
use crate::runner::Scenario;
use serde_json::{Value, json};

/// Wallet seeded with the genesis allocation.
pub const FUNDED_MNEMONIC: &str =
    "abandon baby cabbage dad eager fabric gadget habit ice kangaroo lab absorb";

/// Balance of the funded wallet on a fresh chain.
pub const GENESIS_BALANCE: f64 = 100_000.0;

/// Every built-in scenario, in suite order.
pub fn all() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(SmsgScenario),
        Box::new(AnonScenario),
        Box::new(TxIndexScenario),
        Box::new(TimestampIndexScenario),
    ]
}

pub fn find(name: &str) -> Option<Box<dyn Scenario>> {
    all().into_iter().find(|s| s.name() == name)
}

pub fn names() -> Vec<&'static str> {
    all().iter().map(|s| s.name()).collect()
}

/// Imports an HD master key from `mnemonic` into node `index`'s wallet.
pub(crate) async fn import_master(ctx: &ScenarioContext, index: usize, mnemonic: &str) -> Result<Value> {
    let ro = ctx.call(index, "extkeyimportmaster", json!([mnemonic])).await?;
    let account = str_field(&ro, "account_id")?;
    ctx.ensure(!account.is_empty(), format!("node{index} imported a master key"))?;
    Ok(ro)
}

/// Imports the funded wallet and checks the genesis balance arrived.
pub(crate) async fn import_funded(ctx: &ScenarioContext, index: usize) -> Result<()> {
    import_master(ctx, index, FUNDED_MNEMONIC).await?;
    let info = ctx.node(index)?.get_info().await?;
    ctx.ensure_eq(info.total_balance, GENESIS_BALANCE, format!("node{index} genesis balance"))
}

/// Holds every node's staking balance so blocks only appear on request.
pub(crate) async fn reserve_all(ctx: &ScenarioContext) -> Result<()> {
    for index in 0..ctx.node_count() {
        ctx.reserve_balance(index).await?;
    }
    Ok(())
}

pub(crate) fn flag(name: &str) -> Vec<String> {
    vec![format!("-{name}")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let names = names();
        assert_eq!(names, vec!["smsg", "anon", "txindex", "timestampindex"]);
    }

    #[test]
    fn test_find() {
        assert_eq!(find("txindex").unwrap().node_count(), 4);
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_node_args_match_node_count() {
        for scenario in all() {
            assert_eq!(
                scenario.node_args().len(),
                scenario.node_count(),
                "{}",
                scenario.name()
            );
            assert!(!scenario.description().is_empty());
        }
    }
}
