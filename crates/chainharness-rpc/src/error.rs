//! Error types for node RPC calls.

use std::fmt;
use thiserror::Error;

/// Bitcoin-family RPC error codes the classifier cares about.
pub mod codes {
    /// Generic application error.
    pub const MISC_ERROR: i64 = -1;
    /// Unknown address, key, block or transaction.
    pub const INVALID_ADDRESS_OR_KEY: i64 = -5;
    /// Node has no peers yet.
    pub const CLIENT_NOT_CONNECTED: i64 = -9;
    /// Node is still in initial block download.
    pub const CLIENT_IN_INITIAL_DOWNLOAD: i64 = -10;
    /// Node is still loading (block index, wallet, ...).
    pub const IN_WARMUP: i64 = -28;
    /// JSON-RPC method not found.
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

/// Category of an RPC failure, used to decide who handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorKind {
    /// The requested object does not exist (yet). Absorbed by convergence polling.
    NotFound,
    /// The node rejected the call because a feature is switched off.
    FeatureDisabled,
    /// The node could not be reached or is still starting. Absorbed by polling.
    Unavailable,
    /// Anything else.
    Fatal,
}

impl RpcErrorKind {
    /// Whether a poller should treat this as "not yet true".
    pub fn is_transient(self) -> bool {
        matches!(self, RpcErrorKind::NotFound | RpcErrorKind::Unavailable)
    }
}

impl fmt::Display for RpcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcErrorKind::NotFound => "not-found",
            RpcErrorKind::FeatureDisabled => "feature-disabled",
            RpcErrorKind::Unavailable => "unavailable",
            RpcErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// A failed RPC call against one node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{node}: {method} failed [{kind}{}]: {message}", code_suffix(.code))]
pub struct RpcError {
    pub kind: RpcErrorKind,
    /// Application error code from the response body, if any.
    pub code: Option<i64>,
    pub message: String,
    pub method: String,
    pub node: String,
}

fn code_suffix(code: &Option<i64>) -> String {
    code.map(|c| format!(", code {c}")).unwrap_or_default()
}

impl RpcError {
    pub fn new(
        kind: RpcErrorKind,
        code: Option<i64>,
        message: impl Into<String>,
        method: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            method: method.into(),
            node: node.into(),
        }
    }

    /// Builds an error from an application error object, classifying it.
    pub fn from_application(
        code: i64,
        message: impl Into<String>,
        method: impl Into<String>,
        node: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let kind = classify(code, &message);
        Self::new(kind, Some(code), message, method, node)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Maps an application error code and message to a category.
pub fn classify(code: i64, message: &str) -> RpcErrorKind {
    let lower = message.to_ascii_lowercase();

    if lower.contains("disabled") || lower.contains("not enabled") {
        return RpcErrorKind::FeatureDisabled;
    }

    match code {
        codes::IN_WARMUP | codes::CLIENT_NOT_CONNECTED | codes::CLIENT_IN_INITIAL_DOWNLOAD => {
            RpcErrorKind::Unavailable
        }
        codes::INVALID_ADDRESS_OR_KEY
            if lower.contains("not found")
                || lower.contains("not in mempool")
                || lower.contains("no such") =>
        {
            RpcErrorKind::NotFound
        }
        _ => RpcErrorKind::Fatal,
    }
}

/// Result type for RPC calls.
pub type Result<T> = std::result::Result<T, RpcError>;
