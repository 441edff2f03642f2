//! Shared node state, gossip and block production.

use crate::args::NodeArgs;
use crate::chain::{Block, Chain, Connect, Transaction};
use crate::error::Result;
use crate::p2p::{
    BlockMsg, BlocksRequest, BlocksResponse, Hello, HelloAck, PROTOCOL_VERSION, Peers, SmsgMsg,
    TxMsg,
};
use crate::smsg::{SmsgMessage, SmsgStore};
use crate::wallet::{FUNDED_MNEMONIC, GENESIS_ALLOCATION_SAT, Wallet, root_address};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const GOSSIP_TIMEOUT: Duration = Duration::from_secs(5);

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Everything behind the node lock.
#[derive(Debug)]
pub struct NodeState {
    pub chain: Chain,
    pub wallet: Wallet,
    pub smsg: SmsgStore,
    pub peers: Peers,
}

impl NodeState {
    fn new(args: &NodeArgs) -> Self {
        let genesis = Block::genesis(&root_address(FUNDED_MNEMONIC), GENESIS_ALLOCATION_SAT);
        Self {
            chain: Chain::new(genesis),
            wallet: Wallet::new(),
            smsg: SmsgStore::new(args.smsg_scan_incoming),
            peers: Peers::default(),
        }
    }

    /// Mempool admission plus wallet credit. False if already known.
    pub fn accept_tx(&mut self, tx: &Transaction) -> bool {
        if !self.chain.accept_tx(tx.clone()) {
            return false;
        }
        self.wallet.credit(tx);
        true
    }

    fn connect_block(&mut self, block: &Block) -> Connect {
        let outcome = self.chain.connect(block.clone());
        if outcome == Connect::Extended {
            for tx in &block.tx {
                self.wallet.credit(tx);
            }
        }
        outcome
    }
}

/// A running devnode.
#[derive(Debug)]
pub struct Node {
    args: NodeArgs,
    listen_addr: String,
    http: reqwest::Client,
    state: Mutex<NodeState>,
    ready: AtomicBool,
    entropy: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl Node {
    pub fn new(args: NodeArgs, listen_addr: String) -> Result<Arc<Self>> {
        let http = reqwest::Client::builder().timeout(GOSSIP_TIMEOUT).build()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            state: Mutex::new(NodeState::new(&args)),
            args,
            listen_addr,
            http,
            ready: AtomicBool::new(false),
            entropy: AtomicU64::new(0),
            shutdown,
        }))
    }

    /// Locks the node state. Never held across an await.
    pub fn state(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn args(&self) -> &NodeArgs {
        &self.args
    }

    /// Peer listen address, `host:port`.
    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Fresh bytes for `mnemonic new`.
    pub fn entropy(&self) -> Vec<u8> {
        let counter = self.entropy.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        format!("{}:{counter}:{nanos}", self.listen_addr).into_bytes()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    // Gossip out

    /// Posts `body` to every peer except `except`, without waiting.
    fn relay<T: Serialize>(&self, path: &'static str, body: &T, except: Option<&str>) {
        let targets = self.state().peers.relay_targets(except);
        if targets.is_empty() {
            return;
        }
        let body = match serde_json::to_value(body) {
            Ok(body) => body,
            Err(e) => {
                warn!(path, error = %e, "failed to encode gossip");
                return;
            }
        };
        for target in targets {
            let http = self.http.clone();
            let body = body.clone();
            tokio::spawn(async move {
                let url = format!("http://{target}{path}");
                if let Err(e) = http.post(&url).json(&body).send().await {
                    debug!(%url, error = %e, "gossip failed");
                }
            });
        }
    }

    pub fn relay_tx(&self, tx: &Transaction, except: Option<&str>) {
        let msg = TxMsg {
            from: self.listen_addr.clone(),
            tx: tx.clone(),
        };
        self.relay("/p2p/tx", &msg, except);
    }

    pub fn relay_smsg(&self, message: &SmsgMessage, except: Option<&str>) {
        let msg = SmsgMsg {
            from: self.listen_addr.clone(),
            message: message.clone(),
        };
        self.relay("/p2p/smsg", &msg, except);
    }

    fn relay_block(&self, block: &Block, except: Option<&str>) {
        let msg = BlockMsg {
            from: self.listen_addr.clone(),
            block: block.clone(),
        };
        self.relay("/p2p/block", &msg, except);
    }

    // Gossip in

    pub fn on_hello(self: &Arc<Self>, msg: Hello) -> HelloAck {
        let height = {
            let mut state = self.state();
            state.peers.add(&msg.from, true, msg.version, unix_now());
            state.chain.height()
        };
        info!(peer = %msg.from, "inbound peer connected");

        if msg.height > height {
            let node = Arc::clone(self);
            tokio::spawn(async move { node.sync_from(&msg.from).await });
        }
        HelloAck {
            version: PROTOCOL_VERSION,
            height,
        }
    }

    pub async fn on_block(self: &Arc<Self>, block: Block, origin: Option<String>) {
        let outcome = self.state().connect_block(&block);
        match outcome {
            Connect::Extended => {
                debug!(height = block.height, hash = %block.hash, "block connected");
                self.relay_block(&block, origin.as_deref());
            }
            Connect::Orphan => {
                if let Some(origin) = origin {
                    self.sync_from(&origin).await;
                }
            }
            Connect::Known => {}
        }
    }

    pub fn on_tx(&self, tx: Transaction, origin: Option<&str>) -> bool {
        let accepted = self.state().accept_tx(&tx);
        if accepted {
            debug!(txid = %tx.txid, "transaction accepted");
            self.relay_tx(&tx, origin);
        }
        accepted
    }

    pub fn on_smsg(&self, message: SmsgMessage, origin: &str) -> bool {
        let accepted = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.smsg.receive(message.clone(), &state.wallet, unix_now())
        };
        if accepted {
            debug!(msgid = %message.msgid, "secure message stored");
            self.relay_smsg(&message, Some(origin));
        }
        accepted
    }

    pub fn blocks_after(&self, height: u64) -> Vec<Block> {
        self.state().chain.blocks_after(height)
    }

    /// Fetches and connects the blocks `peer` has above our tip.
    pub async fn sync_from(&self, peer: &str) {
        let after = self.state().chain.height();
        let url = format!("http://{peer}/p2p/blocks");
        let response = match self.http.post(&url).json(&BlocksRequest { after }).send().await {
            Ok(response) => response.json::<BlocksResponse>().await,
            Err(e) => Err(e),
        };
        let blocks = match response {
            Ok(response) => response.blocks,
            Err(e) => {
                warn!(%peer, error = %e, "block download failed");
                return;
            }
        };

        for block in blocks {
            let outcome = self.state().connect_block(&block);
            if outcome == Connect::Extended {
                debug!(height = block.height, %peer, "block downloaded");
                self.relay_block(&block, Some(peer));
            }
        }
    }

    /// One outbound handshake with `addr`.
    pub async fn connect_peer(&self, addr: &str) -> Result<()> {
        let height = self.state().chain.height();
        let hello = Hello {
            from: self.listen_addr.clone(),
            version: PROTOCOL_VERSION,
            height,
        };
        let ack: HelloAck = self
            .http
            .post(format!("http://{addr}/p2p/hello"))
            .json(&hello)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.state().peers.add(addr, false, ack.version, unix_now());
        info!(peer = %addr, "outbound peer connected");

        if ack.height > height {
            self.sync_from(addr).await;
        }
        Ok(())
    }

    // Block production

    /// Produces one block if the wallet may stake on the current tip.
    pub fn try_stake(&self) -> Option<Block> {
        let block = {
            let mut guard = self.state();
            let state = &mut *guard;
            if !state.wallet.can_stake(state.chain.height()) {
                return None;
            }
            let block = Block::child(
                state.chain.tip(),
                unix_now(),
                state.chain.mempool_txs(),
                &self.listen_addr,
            );
            state.connect_block(&block);
            block
        };

        info!(
            height = block.height,
            hash = %block.hash,
            txs = block.tx.len(),
            "staked block"
        );
        self.relay_block(&block, None);
        Some(block)
    }

    /// Stakes on every tick until shutdown.
    pub async fn run_staker(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.args.stake_interval);
        let mut shutdown = self.shutdown_signal();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.is_ready() {
                        self.try_stake();
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::COIN;
    use std::path::PathBuf;

    fn node() -> Arc<Node> {
        let args = NodeArgs::parse(["-datadir=/tmp/devnode-test"]).unwrap();
        Node::new(args, "127.0.0.1:1".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_staking_requires_funded_unreserved_wallet() {
        let node = node();
        assert!(node.try_stake().is_none());

        {
            let mut guard = node.state();
            let state = &mut *guard;
            state.wallet.import_master(FUNDED_MNEMONIC, &state.chain).unwrap();
            state.wallet.set_stake_limit(2);
        }
        assert_eq!(node.try_stake().unwrap().height, 1);
        assert_eq!(node.try_stake().unwrap().height, 2);
        assert!(node.try_stake().is_none());

        node.state().wallet.set_stake_limit(0);
        node.state().wallet.set_reserved(true);
        assert!(node.try_stake().is_none());
        assert_eq!(node.state().chain.height(), 2);
    }

    #[tokio::test]
    async fn test_staked_block_takes_mempool() {
        let node = node();
        let tx = {
            let mut guard = node.state();
            let state = &mut *guard;
            state.wallet.import_master(FUNDED_MNEMONIC, &state.chain).unwrap();
            let to = state.wallet.new_address().unwrap();
            let tx = state
                .wallet
                .build_send(&to, 5 * COIN, crate::chain::OutputKind::Part, crate::chain::OutputKind::Part, "", 1)
                .unwrap();
            assert!(state.accept_tx(&tx));
            assert!(!state.accept_tx(&tx));
            tx
        };

        let block = node.try_stake().unwrap();
        assert!(block.tx.iter().any(|t| t.txid == tx.txid));
        assert!(node.state().chain.raw_mempool().is_empty());
        // Sent to self: the full allocation minus the fee remains
        assert_eq!(
            node.state().wallet.balances().part,
            GENESIS_ALLOCATION_SAT - crate::wallet::FEE_SAT
        );
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let node = node();
        let mut signal = node.shutdown_signal();
        assert!(!*signal.borrow());
        node.request_shutdown();
        signal.wait_for(|stop| *stop).await.unwrap();
        assert_eq!(node.args().data_dir, PathBuf::from("/tmp/devnode-test"));
    }
}
