//! Scenario runner.
//!
//! A [`Scenario`] declares its node count and per-node flags, requests peer
//! links in [`Scenario::setup_network`] and then drives the cluster through a
//! [`ScenarioContext`]. The [`ScenarioRunner`] owns everything around that:
//!
//! - a fresh working directory per run, kept or removed per `keep_data`
//! - cluster startup, topology verification and guaranteed teardown
//! - a [`Journal`] of every call, wait and check
//! - a [`ScenarioResult`] with the failing step and diagnostics
//!
//! The built-in scenarios live in [`scenarios`].

pub mod context;
pub mod error;
pub mod journal;
pub mod result;
pub mod runner;
pub mod scenarios;

pub use context::{ScenarioContext, array_field, str_field};
pub use error::{AssertionFailure, Result, ScenarioError};
pub use journal::{Journal, JournalEntry};
pub use result::{Diagnostics, Failure, Outcome, ScenarioResult};
pub use runner::{Scenario, ScenarioRunner};
