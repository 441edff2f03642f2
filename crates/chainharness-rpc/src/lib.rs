//! JSON-RPC client for nodes under test.
//!
//! A [`RpcClient`] is a cheap, cloneable view of one node's control API. It
//! performs exactly one HTTP round trip per [`RpcClient::call`] and never
//! retries; retry policy belongs to the convergence engine. Failures come back
//! as [`RpcError`] with a [`RpcErrorKind`] the caller can match on.

pub mod client;
pub mod error;
pub mod methods;

pub use client::{RpcClient, RpcEndpoint, RpcObserver};
pub use error::{RpcError, RpcErrorKind, Result};
pub use methods::{
    BlockInfo, BucketTotals, MempoolEntry, NetworkInfo, NodeInfo, PeerInfo, SmsgBuckets,
};
