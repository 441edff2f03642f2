//! Typed wrappers for the node RPC methods the harness relies on.
//!
//! Scenario-specific calls go through [`RpcClient::call`] directly; only the
//! methods the engine itself needs (readiness, heights, mempool, peers,
//! block production, message buckets) get structs here.

use crate::client::RpcClient;
use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

/// Reserved amount that keeps a staking wallet idle.
pub const RESERVE_ALL: u64 = 10_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub blocks: u64,
    #[serde(default)]
    pub total_balance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default)]
    pub localservices_str: String,
    #[serde(default)]
    pub connections: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub addr: String,
    #[serde(default)]
    pub inbound: bool,
    /// Zero until the version handshake completes.
    #[serde(default)]
    pub version: u64,
}

impl PeerInfo {
    pub fn handshake_complete(&self) -> bool {
        self.version != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolEntry {
    pub size: u64,
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    #[serde(default)]
    pub tx: Vec<String>,
    #[serde(default)]
    pub previousblockhash: Option<String>,
}

/// `smsgbuckets` result. The node reports counts as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsgBuckets {
    pub total: BucketTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTotals {
    #[serde(deserialize_with = "count_from_str_or_int")]
    pub buckets: u64,
    #[serde(deserialize_with = "count_from_str_or_int")]
    pub messages: u64,
}

fn count_from_str_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("negative count {n}"))),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        other => Err(serde::de::Error::custom(format!("expected count, got {other}"))),
    }
}

impl RpcClient {
    pub async fn get_block_count(&self) -> Result<u64> {
        self.call_as("getblockcount", json!([])).await
    }

    pub async fn get_best_block_hash(&self) -> Result<String> {
        self.call_as("getbestblockhash", json!([])).await
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String> {
        self.call_as("getblockhash", json!([height])).await
    }

    pub async fn get_block(&self, hash: &str) -> Result<BlockInfo> {
        self.call_as("getblock", json!([hash])).await
    }

    pub async fn get_info(&self) -> Result<NodeInfo> {
        self.call_as("getinfo", json!([])).await
    }

    pub async fn get_network_info(&self) -> Result<NetworkInfo> {
        self.call_as("getnetworkinfo", json!([])).await
    }

    pub async fn get_peer_info(&self) -> Result<Vec<PeerInfo>> {
        self.call_as("getpeerinfo", json!([])).await
    }

    /// `addnode <addr> onetry`: one outbound connection attempt.
    pub async fn add_node(&self, addr: &str) -> Result<()> {
        self.call("addnode", json!([addr, "onetry"])).await.map(|_| ())
    }

    pub async fn get_mempool_entry(&self, txid: &str) -> Result<MempoolEntry> {
        self.call_as("getmempoolentry", json!([txid])).await
    }

    pub async fn get_raw_mempool(&self) -> Result<Vec<String>> {
        self.call_as("getrawmempool", json!([])).await
    }

    /// Reserves (`true`) or releases (`false`) the staking balance.
    pub async fn reserve_balance(&self, reserve: bool) -> Result<Value> {
        let params = if reserve {
            json!([true, RESERVE_ALL])
        } else {
            json!([false])
        };
        self.call("reservebalance", params).await
    }

    /// Caps block production at `height`.
    pub async fn set_stake_limit(&self, height: u64) -> Result<Value> {
        self.call("walletsettings", json!(["stakelimit", {"height": height}]))
            .await
    }

    pub async fn smsg_buckets(&self) -> Result<SmsgBuckets> {
        self.call_as("smsgbuckets", json!([])).await
    }

    /// Asks the node to shut down.
    pub async fn stop(&self) -> Result<()> {
        self.call("stop", json!([])).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_counts_accept_strings_and_numbers() {
        let from_strings: SmsgBuckets =
            serde_json::from_value(json!({"total": {"buckets": "2", "messages": "3"}})).unwrap();
        assert_eq!(from_strings.total.buckets, 2);
        assert_eq!(from_strings.total.messages, 3);

        let from_numbers: SmsgBuckets =
            serde_json::from_value(json!({"total": {"buckets": 0, "messages": 0}})).unwrap();
        assert_eq!(from_numbers.total.messages, 0);
    }

    #[test]
    fn test_bucket_counts_reject_garbage() {
        let parsed: std::result::Result<SmsgBuckets, _> =
            serde_json::from_value(json!({"total": {"buckets": "x", "messages": "1"}}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_peer_handshake() {
        let pending = PeerInfo {
            addr: "127.0.0.1:11001".to_string(),
            inbound: false,
            version: 0,
        };
        assert!(!pending.handshake_complete());

        let done: PeerInfo =
            serde_json::from_value(json!({"addr": "127.0.0.1:11001", "version": 70015})).unwrap();
        assert!(done.handshake_complete());
        assert!(!done.inbound);
    }
}
