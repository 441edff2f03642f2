//! Convergence engine.
//!
//! Every cross-node assertion in a scenario is a wait: "poll this observable
//! value until it satisfies a predicate, or fail deterministically". This
//! crate provides the one generic primitive, [`await_condition`], and the
//! named waits built on it ([`await_height`], [`await_mempool`],
//! [`await_count`], [`stake_to_height`], ...).
//!
//! Deadlines are measured on tokio's monotonic clock. Transient RPC errors
//! (not found yet, node unreachable) count as "not yet true"; any other error
//! aborts the wait. A timeout always carries the last observed value.

pub mod engine;
pub mod error;
pub mod view;
pub mod waits;

pub use engine::{ConvergenceQuery, Observation, await_condition};
pub use error::{ConvergeError, Result, TimeoutError};
pub use view::{ChainView, Collection};
pub use waits::{
    WaitSettings, await_blocks_synced, await_count, await_height, await_mempool,
    await_mempools_synced, await_peer_connected, stake_blocks, stake_to_height,
};
