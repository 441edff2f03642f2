//! What a scenario sees while it runs.

use crate::error::{AssertionFailure, Result, ScenarioError};
use crate::journal::Journal;
use chainharness_cluster::{ClusterSupervisor, Topology};
use chainharness_converge::{
    self as converge, ChainView, Collection, ConvergeError, WaitSettings,
};
use chainharness_rpc::{MempoolEntry, RpcClient, RpcError, RpcErrorKind};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Clients, waits and assertions over a running cluster.
///
/// Calls made through [`ScenarioContext::node`] are journaled. Convergence
/// polls go through unjournaled clients and are journaled once per wait.
pub struct ScenarioContext {
    cluster: ClusterSupervisor,
    clients: Vec<RpcClient>,
    journal: Journal,
    settings: WaitSettings,
    topology: Topology,
}

impl ScenarioContext {
    pub fn new(cluster: ClusterSupervisor, journal: Journal, settings: WaitSettings) -> Self {
        let observer: Arc<Journal> = Arc::new(journal.clone());
        let clients = cluster
            .nodes()
            .iter()
            .map(|node| node.client().with_observer(observer.clone()))
            .collect();
        Self {
            cluster,
            clients,
            journal,
            settings,
            topology: Topology::new(),
        }
    }

    /// Gives the cluster back for teardown.
    pub fn into_cluster(self) -> ClusterSupervisor {
        self.cluster
    }

    pub fn cluster(&self) -> &ClusterSupervisor {
        &self.cluster
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn settings(&self) -> &WaitSettings {
        &self.settings
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn node_count(&self) -> usize {
        self.clients.len()
    }

    /// Journaled client for node `index`.
    pub fn node(&self, index: usize) -> Result<&RpcClient> {
        self.clients
            .get(index)
            .ok_or(ScenarioError::Cluster(chainharness_cluster::Error::NodeNotFound(index)))
    }

    fn view(&self, index: usize) -> Result<&RpcClient> {
        Ok(self.cluster.client(index)?)
    }

    /// Marks the start of a named step in the journal.
    pub fn step(&self, name: &str) {
        tracing::info!(step = name, "scenario step");
        self.journal.step(name);
    }

    /// Issues a journaled call on node `index`.
    pub async fn call(&self, index: usize, method: &str, params: Value) -> Result<Value> {
        Ok(self.node(index)?.call(method, params).await?)
    }

    // Topology

    pub async fn connect(&mut self, from: usize, to: usize, bidirectional: bool) -> Result<()> {
        self.topology
            .connect(&self.cluster, from, to, bidirectional)
            .await?;
        Ok(())
    }

    /// Links node 0 to every other node.
    pub async fn connect_star(&mut self) -> Result<()> {
        self.topology.connect_star(&self.cluster).await?;
        Ok(())
    }

    /// Waits until every requested link is live.
    pub async fn wait_connected(&self) -> Result<()> {
        let outcome = self
            .topology
            .wait_connected(&self.cluster, &self.settings)
            .await;
        let description = format!("{} peer links connected", self.topology.links().len());
        self.journal.record_wait(
            "cluster",
            &description,
            outcome.as_ref().map(|()| "connected".to_string()).map_err(ToString::to_string),
        );
        Ok(outcome?)
    }

    // Waits

    fn journaled<T: Debug>(
        &self,
        node: &str,
        description: &str,
        outcome: converge::Result<T>,
    ) -> Result<T> {
        self.journal.record_wait(
            node,
            description,
            outcome
                .as_ref()
                .map(|v| format!("{v:?}"))
                .map_err(ConvergeError::to_string),
        );
        Ok(outcome?)
    }

    pub async fn await_height(&self, index: usize, target: u64) -> Result<u64> {
        let view = self.view(index)?;
        let outcome = converge::await_height(view, target, &self.settings).await;
        self.journaled(view.label(), &format!("height >= {target}"), outcome)
    }

    pub async fn stake_to_height(&self, index: usize, target: u64) -> Result<u64> {
        let view = self.view(index)?;
        let outcome = converge::stake_to_height(view, target, &self.settings).await;
        self.journaled(view.label(), &format!("stake to height {target}"), outcome)
    }

    pub async fn stake_blocks(&self, index: usize, blocks: u64) -> Result<u64> {
        let view = self.view(index)?;
        let outcome = converge::stake_blocks(view, blocks, &self.settings).await;
        self.journaled(view.label(), &format!("stake {blocks} blocks"), outcome)
    }

    pub async fn await_mempool(&self, index: usize, txid: &str) -> Result<MempoolEntry> {
        let view = self.view(index)?;
        let outcome = converge::await_mempool(view, txid, &self.settings).await;
        self.journaled(view.label(), &format!("mempool has {txid}"), outcome)
    }

    pub async fn await_count(&self, index: usize, collection: Collection, expected: u64) -> Result<()> {
        let view = self.view(index)?;
        let outcome = converge::await_count(view, collection, expected, &self.settings).await;
        self.journaled(view.label(), &format!("{collection} == {expected}"), outcome)
    }

    /// Waits until both nodes hold exactly `messages` secure messages.
    pub async fn wait_for_exchange(&self, messages: u64, a: usize, b: usize) -> Result<()> {
        for index in [a, b] {
            self.await_count(index, Collection::SmsgMessages, messages)
                .await?;
        }
        Ok(())
    }

    /// Waits until all nodes agree on the best block and the mempool.
    pub async fn sync_all(&self) -> Result<()> {
        let views = (0..self.node_count())
            .map(|i| self.view(i).map(|c| c as &dyn ChainView))
            .collect::<Result<Vec<_>>>()?;

        let blocks = converge::await_blocks_synced(&views, &self.settings).await;
        self.journaled("cluster", "best block hashes agree", blocks)?;

        let mempools = converge::await_mempools_synced(&views, &self.settings).await;
        self.journaled("cluster", "mempools agree", mempools)
    }

    /// Asks node `index` to hold its staking balance.
    pub async fn reserve_balance(&self, index: usize) -> Result<()> {
        self.node(index)?.reserve_balance(true).await?;
        Ok(())
    }

    // Assertions

    /// Fails the scenario with `description` unless `condition` holds.
    pub fn ensure(&self, condition: bool, description: impl Into<String>) -> Result<()> {
        let description = description.into();
        self.journal.record_assertion(&description, condition);
        if condition {
            Ok(())
        } else {
            Err(AssertionFailure::new(description).into())
        }
    }

    /// Fails unless `actual == expected`.
    pub fn ensure_eq<T: PartialEq + Debug>(
        &self,
        actual: T,
        expected: T,
        description: impl Into<String>,
    ) -> Result<()> {
        let description = description.into();
        let passed = actual == expected;
        self.journal.record_assertion(&description, passed);
        if passed {
            Ok(())
        } else {
            Err(AssertionFailure::new(format!(
                "{description}: expected {expected:?}, got {actual:?}"
            ))
            .into())
        }
    }

    /// Requires `outcome` to be an RPC failure of `kind` whose message
    /// contains `needle`; returns that error.
    pub fn expect_rpc_error<T: Debug>(
        &self,
        outcome: chainharness_rpc::Result<T>,
        kind: RpcErrorKind,
        needle: &str,
    ) -> Result<RpcError> {
        let description = format!("call fails with {kind} containing {needle:?}");
        match outcome {
            Err(e) if e.kind == kind && e.message.contains(needle) => {
                self.journal.record_assertion(&description, true);
                Ok(e)
            }
            Err(e) => {
                self.journal.record_assertion(&description, false);
                Err(AssertionFailure::new(format!("{description}: got {e}")).into())
            }
            Ok(value) => {
                self.journal.record_assertion(&description, false);
                Err(AssertionFailure::new(format!("{description}: call succeeded with {value:?}")).into())
            }
        }
    }
}

/// Reads a string field out of an RPC result object.
pub fn str_field<'a>(value: &'a Value, field: &str) -> Result<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AssertionFailure::new(format!("missing string field {field:?} in {value}")).into())
}

/// Reads an array field out of an RPC result object.
pub fn array_field<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| AssertionFailure::new(format!("missing array field {field:?} in {value}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainharness_cluster::ClusterSpec;
    use chainharness_config::HarnessConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn context(temp: &TempDir) -> ScenarioContext {
        let spec = ClusterSpec::uniform(&HarnessConfig::default(), temp.path(), 2, &[]).unwrap();
        let cluster = ClusterSupervisor::new(spec).unwrap();
        ScenarioContext::new(cluster, Journal::new(), WaitSettings::default())
    }

    #[test]
    fn test_nodes_are_journaled_and_bounded() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        assert_eq!(ctx.node_count(), 2);
        assert_eq!(ctx.node(1).unwrap().label(), "node1");
        assert!(matches!(
            ctx.node(2),
            Err(ScenarioError::Cluster(chainharness_cluster::Error::NodeNotFound(2)))
        ));
    }

    #[test]
    fn test_ensure_records_outcome() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);

        ctx.ensure(true, "first").unwrap();
        let err = ctx.ensure(false, "second").unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: second");

        let err = ctx.ensure_eq(2, 3, "inbox size").unwrap_err();
        assert_eq!(err.to_string(), "assertion failed: inbox size: expected 3, got 2");

        assert_eq!(
            ctx.journal().tail(3),
            vec![
                "check first -> ok",
                "check second -> FAILED",
                "check inbox size -> FAILED"
            ]
        );
    }

    #[test]
    fn test_expect_rpc_error() {
        let temp = TempDir::new().unwrap();
        let ctx = context(&temp);
        let disabled = RpcError::from_application(-1, "Secure messaging is disabled.", "smsgsend", "node1");

        let err = ctx
            .expect_rpc_error::<Value>(Err(disabled.clone()), RpcErrorKind::FeatureDisabled, "disabled")
            .unwrap();
        assert_eq!(err, disabled);

        let wrong_kind = ctx.expect_rpc_error::<Value>(Err(disabled), RpcErrorKind::NotFound, "disabled");
        assert!(matches!(wrong_kind, Err(ScenarioError::Assertion(_))));

        let succeeded = ctx.expect_rpc_error(Ok(json!({"result": "Sent."})), RpcErrorKind::FeatureDisabled, "disabled");
        assert!(matches!(succeeded, Err(ScenarioError::Assertion(ref a)) if a.message.contains("succeeded")));
    }

    #[test]
    fn test_field_helpers() {
        let value = json!({"result": "Sent.", "messages": [1, 2]});
        assert_eq!(str_field(&value, "result").unwrap(), "Sent.");
        assert_eq!(array_field(&value, "messages").unwrap().len(), 2);
        assert!(str_field(&value, "messages").is_err());
        assert!(array_field(&value, "missing").is_err());
    }
}
