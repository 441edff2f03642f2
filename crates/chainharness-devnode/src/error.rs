//! Devnode error types.

use serde_json::{Value, json};
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop the devnode from starting or serving.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("-datadir is required")]
    MissingDataDir,

    #[error("failed to read {path}: {source}")]
    ReadConf {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path}:{line}: {reason}")]
    InvalidConf {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("config does not set {0}")]
    MissingSetting(&'static str),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Bitcoin-style application error codes.
pub mod codes {
    pub const MISC_ERROR: i64 = -1;
    pub const WALLET_ERROR: i64 = -4;
    pub const INVALID_ADDRESS_OR_KEY: i64 = -5;
    pub const WALLET_INSUFFICIENT_FUNDS: i64 = -6;
    pub const INVALID_PARAMETER: i64 = -8;
    pub const IN_WARMUP: i64 = -28;
    pub const METHOD_NOT_FOUND: i64 = -32601;
}

/// An RPC error object as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct RpcFailure {
    pub code: i64,
    pub message: String,
}

impl RpcFailure {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn misc(message: impl Into<String>) -> Self {
        Self::new(codes::MISC_ERROR, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_ADDRESS_OR_KEY, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMETER, message)
    }

    pub fn wallet(message: impl Into<String>) -> Self {
        Self::new(codes::WALLET_ERROR, message)
    }

    pub fn insufficient_funds() -> Self {
        Self::new(codes::WALLET_INSUFFICIENT_FUNDS, "Insufficient funds")
    }

    pub fn warmup() -> Self {
        Self::new(codes::IN_WARMUP, "Loading block index...")
    }

    pub fn method_not_found() -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found")
    }

    pub fn to_json(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

/// Result type for RPC handlers.
pub type RpcResult<T> = std::result::Result<T, RpcFailure>;
