//! Ordered record of everything a scenario did.

use chainharness_rpc::{Result as RpcResult, RpcObserver};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MAX_RENDERED: usize = 240;

/// One journal line.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    /// A scenario step boundary.
    Step(String),
    /// An RPC call and its outcome (`Err` holds the rendered error).
    Call {
        node: String,
        method: String,
        params: Value,
        outcome: Result<Value, String>,
    },
    /// A convergence wait and how it resolved.
    Wait {
        node: String,
        description: String,
        outcome: Result<String, String>,
    },
    /// An explicit check.
    Assertion { description: String, passed: bool },
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalEntry::Step(name) => write!(f, "== {name}"),
            JournalEntry::Call {
                node,
                method,
                params,
                outcome,
            } => {
                let params = truncate(&params.to_string());
                match outcome {
                    Ok(value) => write!(f, "{node}: {method} {params} -> {}", truncate(&value.to_string())),
                    Err(e) => write!(f, "{node}: {method} {params} -> ERROR {}", truncate(e)),
                }
            }
            JournalEntry::Wait {
                node,
                description,
                outcome,
            } => match outcome {
                Ok(value) => write!(f, "{node}: wait {description} -> ok ({})", truncate(value)),
                Err(e) => write!(f, "{node}: wait {description} -> FAILED {}", truncate(e)),
            },
            JournalEntry::Assertion {
                description,
                passed,
            } => {
                let verdict = if *passed { "ok" } else { "FAILED" };
                write!(f, "check {description} -> {verdict}")
            }
        }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_RENDERED {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_RENDERED).collect();
    format!("{cut}...")
}

/// Shared, append-only journal. Clones write to the same record.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JournalEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: JournalEntry) {
        self.lock().push(entry);
    }

    pub fn step(&self, name: impl Into<String>) {
        self.push(JournalEntry::Step(name.into()));
    }

    pub fn record_wait(&self, node: &str, description: &str, outcome: Result<String, String>) {
        self.push(JournalEntry::Wait {
            node: node.to_string(),
            description: description.to_string(),
            outcome,
        });
    }

    pub fn record_assertion(&self, description: &str, passed: bool) {
        self.push(JournalEntry::Assertion {
            description: description.to_string(),
            passed,
        });
    }

    /// Copy of every entry so far.
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.lock().clone()
    }

    /// The last `n` entries, rendered.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(n);
        entries[skip..].iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl RpcObserver for Journal {
    fn on_call(&self, node: &str, method: &str, params: &Value, outcome: &RpcResult<Value>) {
        self.push(JournalEntry::Call {
            node: node.to_string(),
            method: method.to_string(),
            params: params.clone(),
            outcome: outcome.clone().map_err(|e| e.to_string()),
        });
    }
}
