//! Error types for convergence waits.

use chainharness_rpc::RpcError;
use std::time::Duration;
use thiserror::Error;

/// A wait exceeded its deadline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "timed out after {elapsed:?} ({attempts} polls) waiting on {node} for {description}; last observed: {last_observed}"
)]
pub struct TimeoutError {
    pub description: String,
    pub node: String,
    pub elapsed: Duration,
    pub attempts: u32,
    /// Result of the final poll, rendered for diagnostics.
    pub last_observed: String,
}

/// Convergence wait errors.
#[derive(Error, Debug, Clone)]
pub enum ConvergeError {
    /// Deadline expired.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// A counted collection went past the expected value.
    #[error("{node}: {description}: observed {observed}, expected exactly {expected}")]
    Overshoot {
        node: String,
        description: String,
        observed: u64,
        expected: u64,
    },

    /// A non-transient RPC error surfaced while polling or steering a node.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl ConvergeError {
    /// Last observed value, where the error carries one.
    pub fn last_observed(&self) -> Option<String> {
        match self {
            ConvergeError::Timeout(t) => Some(t.last_observed.clone()),
            ConvergeError::Overshoot { observed, .. } => Some(observed.to_string()),
            ConvergeError::Rpc(_) => None,
        }
    }
}

/// Result type for convergence waits.
pub type Result<T> = std::result::Result<T, ConvergeError>;
