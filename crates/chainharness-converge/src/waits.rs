//! Named waits built on [`await_condition`].

use crate::engine::{ConvergenceQuery, DEFAULT_INTERVAL, Observation, await_condition};
use crate::error::{ConvergeError, Result};
use crate::view::{ChainView, Collection};
use chainharness_rpc::MempoolEntry;
use std::time::Duration;
use tracing::info;

/// Poll interval and per-kind deadlines for the named waits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSettings {
    pub interval: Duration,
    pub height_timeout: Duration,
    pub mempool_timeout: Duration,
    pub count_timeout: Duration,
    pub sync_timeout: Duration,
    pub connect_timeout: Duration,
    /// Minimum reported entry size before a mempool entry counts as relayed.
    pub min_mempool_size: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            height_timeout: Duration::from_secs(500),
            mempool_timeout: Duration::from_secs(25),
            count_timeout: Duration::from_secs(10),
            sync_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            min_mempool_size: 100,
        }
    }
}

impl WaitSettings {
    /// Copy with a different deadline for [`await_count`].
    pub fn count_within(mut self, timeout: Duration) -> Self {
        self.count_timeout = timeout;
        self
    }

    fn query(&self, description: String, node: &str, timeout: Duration) -> ConvergenceQuery {
        ConvergenceQuery::new(description, timeout)
            .on(node)
            .every(self.interval)
    }
}

/// Waits until `view` reports a chain height of at least `target`.
///
/// Returns the observed height. A target at or below the current height
/// succeeds on the first poll.
pub async fn await_height(view: &dyn ChainView, target: u64, settings: &WaitSettings) -> Result<u64> {
    let query = settings.query(
        format!("chain height >= {target}"),
        view.label(),
        settings.height_timeout,
    );
    await_condition(&query, || async move {
        let height = view.block_count().await?;
        Ok::<_, ConvergeError>(if height >= target {
            Observation::Ready(height)
        } else {
            Observation::Pending(format!("height {height}"))
        })
    })
    .await
}

/// Waits until `view` holds `txid` in its mempool with a relayed-size entry.
///
/// "Not in mempool" answers count as not yet.
pub async fn await_mempool(
    view: &dyn ChainView,
    txid: &str,
    settings: &WaitSettings,
) -> Result<MempoolEntry> {
    let min_size = settings.min_mempool_size;
    let query = settings.query(
        format!("mempool entry {txid} with size >= {min_size}"),
        view.label(),
        settings.mempool_timeout,
    );
    await_condition(&query, || async move {
        let entry = view.mempool_entry(txid).await?;
        Ok::<_, ConvergeError>(if entry.size >= min_size && entry.height >= 0 {
            Observation::Ready(entry)
        } else {
            Observation::Pending(format!("size {} height {}", entry.size, entry.height))
        })
    })
    .await
}

/// Waits until `collection` on `view` counts exactly `expected`.
///
/// A count above `expected` fails at once with [`ConvergeError::Overshoot`].
pub async fn await_count(
    view: &dyn ChainView,
    collection: Collection,
    expected: u64,
    settings: &WaitSettings,
) -> Result<()> {
    let description = format!("{collection} == {expected}");
    let query = settings.query(description.clone(), view.label(), settings.count_timeout);
    let description = description.as_str();

    await_condition(&query, || async move {
        let observed = view.count(collection).await?;
        if observed > expected {
            return Err(ConvergeError::Overshoot {
                node: view.label().to_string(),
                description: description.to_string(),
                observed,
                expected,
            });
        }
        Ok::<_, ConvergeError>(if observed == expected {
            Observation::Ready(())
        } else {
            Observation::Pending(format!("{collection} {observed}"))
        })
    })
    .await
}

/// Waits until every node reports the same best block hash; returns it.
pub async fn await_blocks_synced(views: &[&dyn ChainView], settings: &WaitSettings) -> Result<String> {
    let query = settings.query(
        "identical best block hash".to_string(),
        &labels(views),
        settings.sync_timeout,
    );
    await_condition(&query, || async move {
        let mut hashes = Vec::with_capacity(views.len());
        for view in views {
            hashes.push(view.best_block_hash().await?);
        }
        Ok::<_, ConvergeError>(match hashes.first() {
            Some(first) if hashes.iter().all(|h| h == first) => Observation::Ready(first.clone()),
            None => Observation::Ready(String::new()),
            Some(_) => Observation::Pending(render_per_node(views, &hashes)),
        })
    })
    .await
}

/// Waits until every node reports the same set of mempool transactions.
pub async fn await_mempools_synced(views: &[&dyn ChainView], settings: &WaitSettings) -> Result<()> {
    let query = settings.query(
        "identical mempool contents".to_string(),
        &labels(views),
        settings.sync_timeout,
    );
    await_condition(&query, || async move {
        let mut pools = Vec::with_capacity(views.len());
        for view in views {
            let mut pool = view.raw_mempool().await?;
            pool.sort();
            pools.push(pool);
        }
        Ok::<_, ConvergeError>(match pools.first() {
            Some(first) if !pools.iter().all(|p| p == first) => {
                let sizes: Vec<String> = pools.iter().map(|p| format!("{} txs", p.len())).collect();
                Observation::Pending(render_per_node(views, &sizes))
            }
            _ => Observation::Ready(()),
        })
    })
    .await
}

/// Waits until `view` lists an outbound, handshaken connection to `addr`.
pub async fn await_peer_connected(view: &dyn ChainView, addr: &str, settings: &WaitSettings) -> Result<()> {
    let query = settings.query(
        format!("outbound peer {addr} with completed handshake"),
        view.label(),
        settings.connect_timeout,
    );
    await_condition(&query, || async move {
        let peers = view.peers().await?;
        let matching: Vec<_> = peers.iter().filter(|p| !p.inbound && p.addr == addr).collect();
        Ok::<_, ConvergeError>(if matching.iter().any(|p| p.handshake_complete()) {
            Observation::Ready(())
        } else if matching.is_empty() {
            Observation::Pending(format!("{} peers, none to {addr}", peers.len()))
        } else {
            Observation::Pending(format!("{addr} listed, handshake pending"))
        })
    })
    .await
}

/// Lets `staker` produce blocks up to exactly `target`, then pauses production.
///
/// Sets the production height limit, releases the balance reservation, waits
/// for the height, and re-reserves the balance before returning. The
/// reservation is restored even when the wait fails.
pub async fn stake_to_height(staker: &dyn ChainView, target: u64, settings: &WaitSettings) -> Result<u64> {
    info!(node = staker.label(), target, "staking to height");
    staker.set_stake_limit(target).await?;
    staker.reserve_balance(false).await?;

    let reached = await_height(staker, target, settings).await;
    let paused = staker.reserve_balance(true).await;

    let height = reached?;
    paused?;
    Ok(height)
}

/// Stakes `blocks` blocks on top of the current height.
pub async fn stake_blocks(staker: &dyn ChainView, blocks: u64, settings: &WaitSettings) -> Result<u64> {
    let height = staker.block_count().await?;
    stake_to_height(staker, height + blocks, settings).await
}

fn labels(views: &[&dyn ChainView]) -> String {
    views.iter().map(|v| v.label()).collect::<Vec<_>>().join(",")
}

fn render_per_node(views: &[&dyn ChainView], values: &[String]) -> String {
    views
        .iter()
        .zip(values)
        .map(|(view, value)| format!("{}={value}", view.label()))
        .collect::<Vec<_>>()
        .join(" ")
}
