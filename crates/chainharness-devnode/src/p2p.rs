//! Peer endpoints and gossip messages.
//!
//! Peers talk JSON over HTTP. Every gossip message names the sender's listen
//! address so receivers can relay around it and fetch missing blocks.

use crate::chain::{Block, Transaction};
use crate::node::Node;
use crate::smsg::SmsgMessage;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Protocol version reported in the handshake.
pub const PROTOCOL_VERSION: u64 = 90_008;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub from: String,
    pub version: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAck {
    pub version: u64,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMsg {
    pub from: String,
    pub block: Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksRequest {
    pub after: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksResponse {
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxMsg {
    pub from: String,
    pub tx: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsgMsg {
    pub from: String,
    pub message: SmsgMessage,
}

/// One entry of `getpeerinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub id: u64,
    /// The peer's listen address.
    pub addr: String,
    pub inbound: bool,
    pub version: u64,
    pub conntime: u64,
}

impl PeerEntry {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "addr": self.addr,
            "inbound": self.inbound,
            "version": self.version,
            "subver": "/chainharness-devnode/",
            "conntime": self.conntime,
        })
    }
}

/// Connection table. One entry per direction per peer.
#[derive(Debug, Clone, Default)]
pub struct Peers {
    entries: Vec<PeerEntry>,
    next_id: u64,
}

impl Peers {
    /// Records a completed handshake; an existing entry for the same
    /// address and direction is refreshed instead of duplicated.
    pub fn add(&mut self, addr: &str, inbound: bool, version: u64, now: u64) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.addr == addr && e.inbound == inbound)
        {
            entry.version = version;
            return;
        }
        self.entries.push(PeerEntry {
            id: self.next_id,
            addr: addr.to_string(),
            inbound,
            version,
            conntime: now,
        });
        self.next_id += 1;
    }

    pub fn entries(&self) -> &[PeerEntry] {
        &self.entries
    }

    /// Distinct listen addresses to relay to, excluding `except`.
    pub fn relay_targets(&self, except: Option<&str>) -> Vec<String> {
        let mut targets: Vec<String> = self
            .entries
            .iter()
            .map(|e| e.addr.clone())
            .filter(|addr| Some(addr.as_str()) != except)
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }
}

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/p2p/hello", post(hello))
        .route("/p2p/block", post(block))
        .route("/p2p/blocks", post(blocks))
        .route("/p2p/tx", post(tx))
        .route("/p2p/smsg", post(smsg))
        .with_state(node)
}

async fn hello(State(node): State<Arc<Node>>, Json(msg): Json<Hello>) -> Json<HelloAck> {
    Json(node.on_hello(msg))
}

async fn block(State(node): State<Arc<Node>>, Json(msg): Json<BlockMsg>) -> Json<Value> {
    node.on_block(msg.block, Some(msg.from)).await;
    Json(json!({}))
}

async fn blocks(State(node): State<Arc<Node>>, Json(req): Json<BlocksRequest>) -> Json<BlocksResponse> {
    Json(BlocksResponse {
        blocks: node.blocks_after(req.after),
    })
}

async fn tx(State(node): State<Arc<Node>>, Json(msg): Json<TxMsg>) -> Json<Value> {
    node.on_tx(msg.tx, Some(&msg.from));
    Json(json!({}))
}

async fn smsg(State(node): State<Arc<Node>>, Json(msg): Json<SmsgMsg>) -> Json<Value> {
    node.on_smsg(msg.message, &msg.from);
    Json(json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_entry_per_direction() {
        let mut peers = Peers::default();
        peers.add("127.0.0.1:11001", false, PROTOCOL_VERSION, 1);
        peers.add("127.0.0.1:11001", false, PROTOCOL_VERSION, 2);
        peers.add("127.0.0.1:11001", true, PROTOCOL_VERSION, 3);

        assert_eq!(peers.entries().len(), 2);
        assert_eq!(peers.entries().iter().filter(|e| !e.inbound).count(), 1);
        assert_eq!(peers.relay_targets(None), vec!["127.0.0.1:11001"]);
    }

    #[test]
    fn test_relay_skips_origin() {
        let mut peers = Peers::default();
        peers.add("127.0.0.1:11001", false, PROTOCOL_VERSION, 1);
        peers.add("127.0.0.1:11002", true, PROTOCOL_VERSION, 1);

        assert_eq!(
            peers.relay_targets(Some("127.0.0.1:11001")),
            vec!["127.0.0.1:11002"]
        );
    }

    #[test]
    fn test_peer_json() {
        let mut peers = Peers::default();
        peers.add("127.0.0.1:11001", true, PROTOCOL_VERSION, 7);
        let entry = peers.entries()[0].to_json();
        assert_eq!(entry["addr"], "127.0.0.1:11001");
        assert_eq!(entry["inbound"], true);
        assert_eq!(entry["version"], PROTOCOL_VERSION);
    }
}
