//! The read/steer surface the named waits need from a node.

use async_trait::async_trait;
use chainharness_rpc::{MempoolEntry, PeerInfo, Result, RpcClient};
use std::fmt;

/// A countable, RPC-observable collection on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Chain height as reported by `getblockcount`.
    Blocks,
    /// `smsgbuckets` total message count.
    SmsgMessages,
    /// `smsgbuckets` bucket count.
    SmsgBuckets,
    /// Transactions in `getrawmempool`.
    Mempool,
    /// Entries in `getpeerinfo`.
    Peers,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Blocks => "block count",
            Collection::SmsgMessages => "smsg message count",
            Collection::SmsgBuckets => "smsg bucket count",
            Collection::Mempool => "mempool size",
            Collection::Peers => "peer count",
        };
        f.write_str(name)
    }
}

/// Node state as seen by the convergence waits.
///
/// [`RpcClient`] is the production implementation; tests substitute scripted
/// views.
#[async_trait]
pub trait ChainView: Send + Sync {
    /// Label used in wait descriptions and timeout reports.
    fn label(&self) -> &str;

    async fn block_count(&self) -> Result<u64>;

    async fn best_block_hash(&self) -> Result<String>;

    async fn mempool_entry(&self, txid: &str) -> Result<MempoolEntry>;

    async fn raw_mempool(&self) -> Result<Vec<String>>;

    async fn peers(&self) -> Result<Vec<PeerInfo>>;

    async fn count(&self, collection: Collection) -> Result<u64>;

    /// Reserve (`true`) or release (`false`) the staking balance.
    async fn reserve_balance(&self, reserve: bool) -> Result<()>;

    async fn set_stake_limit(&self, height: u64) -> Result<()>;
}

#[async_trait]
impl ChainView for RpcClient {
    fn label(&self) -> &str {
        RpcClient::label(self)
    }

    async fn block_count(&self) -> Result<u64> {
        self.get_block_count().await
    }

    async fn best_block_hash(&self) -> Result<String> {
        self.get_best_block_hash().await
    }

    async fn mempool_entry(&self, txid: &str) -> Result<MempoolEntry> {
        self.get_mempool_entry(txid).await
    }

    async fn raw_mempool(&self) -> Result<Vec<String>> {
        self.get_raw_mempool().await
    }

    async fn peers(&self) -> Result<Vec<PeerInfo>> {
        self.get_peer_info().await
    }

    async fn count(&self, collection: Collection) -> Result<u64> {
        match collection {
            Collection::Blocks => self.get_block_count().await,
            Collection::SmsgMessages => Ok(self.smsg_buckets().await?.total.messages),
            Collection::SmsgBuckets => Ok(self.smsg_buckets().await?.total.buckets),
            Collection::Mempool => Ok(self.get_raw_mempool().await?.len() as u64),
            Collection::Peers => Ok(self.get_peer_info().await?.len() as u64),
        }
    }

    async fn reserve_balance(&self, reserve: bool) -> Result<()> {
        RpcClient::reserve_balance(self, reserve).await.map(|_| ())
    }

    async fn set_stake_limit(&self, height: u64) -> Result<()> {
        RpcClient::set_stake_limit(self, height).await.map(|_| ())
    }
}
