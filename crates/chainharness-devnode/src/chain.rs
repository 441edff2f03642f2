//! Block chain, mempool and the optional indexes.
//!
//! There is no consensus here: a block is accepted when it extends the tip,
//! and hashes are blake3 digests of deterministic inputs.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

pub const COIN: u64 = 100_000_000;

/// Timestamp of the genesis block.
pub const GENESIS_TIME: u64 = 1_500_000_000;

/// Hex blake3 digest of `parts`, each length-prefixed.
pub fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize().to_hex().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Part,
    Blind,
    Anon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub value_sat: u64,
    pub kind: OutputKind,
}

impl TxOutput {
    fn verbose(&self, n: usize) -> Value {
        let mut out = json!({
            "n": n,
            "type": match self.kind {
                OutputKind::Part => "standard",
                OutputKind::Blind => "blind",
                OutputKind::Anon => "anon",
            },
            "scriptPubKey": {"addresses": [self.address]},
        });
        // Only plain outputs reveal their value
        if self.kind == OutputKind::Part {
            out["value"] = json!(self.value_sat as f64 / COIN as f64);
            out["valueSat"] = json!(self.value_sat);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub time: u64,
    #[serde(default)]
    pub narration: String,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Builds a transaction; `salt` keeps otherwise identical sends apart.
    pub fn new(outputs: Vec<TxOutput>, narration: &str, time: u64, salt: &str) -> Self {
        let encoded = serde_json::to_vec(&outputs).unwrap_or_default();
        let txid = digest(&[
            b"tx",
            &encoded,
            narration.as_bytes(),
            &time.to_le_bytes(),
            salt.as_bytes(),
        ]);
        Self {
            txid,
            time,
            narration: narration.to_string(),
            outputs,
        }
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> u64 {
        serde_json::to_vec(self).map_or(0, |b| b.len() as u64)
    }

    pub fn hex(&self) -> String {
        serde_json::to_vec(self)
            .unwrap_or_default()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// `getrawtransaction <txid> 1` shape.
    pub fn verbose(&self, block: Option<(&Block, u64)>) -> Value {
        let vout: Vec<Value> = self
            .outputs
            .iter()
            .enumerate()
            .map(|(n, output)| output.verbose(n))
            .collect();
        let mut out = json!({
            "txid": self.txid,
            "hash": self.txid,
            "size": self.size(),
            "time": self.time,
            "vin": [],
            "vout": vout,
            "hex": self.hex(),
        });
        if let Some((block, confirmations)) = block {
            out["blockhash"] = json!(block.hash);
            out["blocktime"] = json!(block.time);
            out["confirmations"] = json!(confirmations);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    pub previousblockhash: Option<String>,
    pub tx: Vec<Transaction>,
}

impl Block {
    /// Genesis block paying the initial allocation to `address`.
    pub fn genesis(address: &str, allocation_sat: u64) -> Self {
        let coinbase = Transaction::new(
            vec![TxOutput {
                address: address.to_string(),
                value_sat: allocation_sat,
                kind: OutputKind::Part,
            }],
            "",
            GENESIS_TIME,
            "genesis",
        );
        Self {
            hash: digest(&[b"genesis", coinbase.txid.as_bytes()]),
            height: 0,
            time: GENESIS_TIME,
            previousblockhash: None,
            tx: vec![coinbase],
        }
    }

    /// Next block on top of `prev`, at `now` or one second after `prev`.
    pub fn child(prev: &Block, now: u64, tx: Vec<Transaction>, staker: &str) -> Self {
        let height = prev.height + 1;
        let time = now.max(prev.time + 1);
        let txids: Vec<&[u8]> = tx.iter().map(|t| t.txid.as_bytes()).collect();
        let hash = digest(&[
            prev.hash.as_bytes(),
            &height.to_le_bytes(),
            &time.to_le_bytes(),
            &txids.concat(),
            staker.as_bytes(),
        ]);
        Self {
            hash,
            height,
            time,
            previousblockhash: Some(prev.hash.clone()),
            tx,
        }
    }

    /// `getblock <hash>` shape.
    pub fn summary(&self, tip_height: u64) -> Value {
        json!({
            "hash": self.hash,
            "height": self.height,
            "time": self.time,
            "confirmations": tip_height.saturating_sub(self.height) + 1,
            "previousblockhash": self.previousblockhash,
            "tx": self.tx.iter().map(|t| t.txid.clone()).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connect {
    /// Appended at the tip.
    Extended,
    /// Already have it, or it is on a shorter branch.
    Known,
    /// Parent unknown; blocks are missing below it.
    Orphan,
}

#[derive(Debug, Clone)]
struct MempoolEntry {
    tx: Transaction,
    height: u64,
    sequence: u64,
}

/// Chain state, mempool and lookups.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    by_hash: HashMap<String, u64>,
    /// txid -> height of the block holding it
    tx_index: HashMap<String, u64>,
    mempool: HashMap<String, MempoolEntry>,
    sequence: u64,
}

impl Chain {
    pub fn new(genesis: Block) -> Self {
        let mut chain = Self {
            blocks: Vec::new(),
            by_hash: HashMap::new(),
            tx_index: HashMap::new(),
            mempool: HashMap::new(),
            sequence: 0,
        };
        chain.push(genesis);
        chain
    }

    fn push(&mut self, block: Block) {
        self.by_hash.insert(block.hash.clone(), block.height);
        for tx in &block.tx {
            self.tx_index.insert(tx.txid.clone(), block.height);
            self.mempool.remove(&tx.txid);
        }
        self.blocks.push(block);
    }

    pub fn tip(&self) -> &Block {
        // Never empty: constructed with a genesis block
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn height(&self) -> u64 {
        self.tip().height
    }

    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(height).ok()?)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|h| self.block_at(*h))
    }

    /// Blocks above `height`, in order.
    pub fn blocks_after(&self, height: u64) -> Vec<Block> {
        self.blocks
            .iter()
            .skip_while(|b| b.height <= height)
            .cloned()
            .collect()
    }

    pub fn connect(&mut self, block: Block) -> Connect {
        if self.by_hash.contains_key(&block.hash) || block.height <= self.height() {
            return Connect::Known;
        }
        if block.height > self.height() + 1
            || block.previousblockhash.as_deref() != Some(self.tip().hash.as_str())
        {
            return Connect::Orphan;
        }
        self.push(block);
        Connect::Extended
    }

    /// Whether `txid` is in a block or the mempool.
    pub fn knows_tx(&self, txid: &str) -> bool {
        self.tx_index.contains_key(txid) || self.mempool.contains_key(txid)
    }

    /// Adds `tx` to the mempool. Returns false if it was already known.
    pub fn accept_tx(&mut self, tx: Transaction) -> bool {
        if self.knows_tx(&tx.txid) {
            return false;
        }
        self.sequence += 1;
        let entry = MempoolEntry {
            tx,
            height: self.height(),
            sequence: self.sequence,
        };
        self.mempool.insert(entry.tx.txid.clone(), entry);
        true
    }

    /// Mempool transactions in arrival order.
    pub fn mempool_txs(&self) -> Vec<Transaction> {
        let mut entries: Vec<&MempoolEntry> = self.mempool.values().collect();
        entries.sort_by_key(|e| e.sequence);
        entries.into_iter().map(|e| e.tx.clone()).collect()
    }

    pub fn raw_mempool(&self) -> Vec<String> {
        let mut txids: Vec<String> = self.mempool.keys().cloned().collect();
        txids.sort();
        txids
    }

    /// `getmempoolentry` shape.
    pub fn mempool_entry(&self, txid: &str) -> Option<Value> {
        self.mempool.get(txid).map(|e| {
            json!({
                "size": e.tx.size(),
                "vsize": e.tx.size(),
                "height": e.height,
                "time": e.tx.time,
            })
        })
    }

    pub fn mempool_tx(&self, txid: &str) -> Option<&Transaction> {
        self.mempool.get(txid).map(|e| &e.tx)
    }

    /// Confirmed transaction and its block, via the transaction index.
    pub fn confirmed_tx(&self, txid: &str) -> Option<(&Transaction, &Block)> {
        let block = self.block_at(*self.tx_index.get(txid)?)?;
        let tx = block.tx.iter().find(|t| t.txid == txid)?;
        Some((tx, block))
    }

    /// Hashes of blocks with `low <= time < high`, oldest first.
    pub fn hashes_between(&self, high: u64, low: u64) -> Vec<String> {
        let mut blocks: Vec<&Block> = self
            .blocks
            .iter()
            .filter(|b| b.time >= low && b.time < high)
            .collect();
        blocks.sort_by_key(|b| (b.time, b.height));
        blocks.into_iter().map(|b| b.hash.clone()).collect()
    }

    /// Every transaction in blocks and mempool.
    pub fn all_txs(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks
            .iter()
            .flat_map(|b| b.tx.iter())
            .chain(self.mempool.values().map(|e| &e.tx))
    }
}
